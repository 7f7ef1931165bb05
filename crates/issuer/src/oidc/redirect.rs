//! Redirect URI matching.
//!
//! Registered redirect URIs are compared by exact string equality. The only
//! exception is native-app loopback redirects (RFC 8252 section 7.3): when the
//! requested host is the literal `127.0.0.1` or `::1`, the port may differ from
//! the registered one so apps can bind to ephemeral ports.

use url::Url;

/// Base used to resolve scheme-less entries such as `127.0.0.1:5000`.
const SCHEMELESS_BASE: &str = "x-schemeless://placeholder/";

/// Loopback hosts exactly as they must be written in the URI.
const LOOPBACK_HOSTS: [&str; 2] = ["127.0.0.1", "[::1]"];

/// Determine whether `candidate` is an allowed redirect target given the
/// client's registered `permitted` URIs.
pub fn is_allowed_redirect_uri(permitted: &[String], candidate: &str) -> bool {
    if permitted.iter().any(|uri| uri == candidate) {
        return true;
    }

    let Some(requested) = LooseUri::parse(candidate) else {
        return false;
    };

    if !requested.is_loopback() {
        return false;
    }

    // Unparseable registrations are skipped so one bad entry cannot break the rest.
    permitted
        .iter()
        .filter_map(|uri| LooseUri::parse(uri))
        .any(|allowed| allowed == requested)
}

/// The URI components that take part in loopback matching, sliced from the
/// input as written. Port is absent, so equality ignores it.
#[derive(Debug, PartialEq, Eq)]
struct LooseUri {
    scheme: String,
    username: Option<String>,
    password: Option<String>,
    hostname: String,
    path: String,
    query: Option<String>,
    fragment: Option<String>,
}

impl LooseUri {
    fn parse(raw: &str) -> Option<Self> {
        let prefixed;
        let input = if raw.contains("//") {
            raw
        } else {
            prefixed = format!("//{raw}");
            prefixed.as_str()
        };

        // The url crate only decides whether the input is well formed. Its
        // output is normalized (hosts, dot segments) and is never compared.
        let base = Url::parse(SCHEMELESS_BASE).ok()?;
        Url::options().base_url(Some(&base)).parse(input).ok()?;

        let (scheme, rest) = split_scheme(input);
        let rest = rest.strip_prefix("//")?;
        let (rest, fragment) = split_once_opt(rest, '#');
        let (rest, query) = split_once_opt(rest, '?');
        let authority_end = rest.find('/').unwrap_or(rest.len());
        let (authority, path) = rest.split_at(authority_end);

        let (userinfo, host_port) = match authority.rsplit_once('@') {
            Some((userinfo, host_port)) => (Some(userinfo), host_port),
            None => (None, authority),
        };
        let (username, password) = match userinfo {
            Some(info) => match info.split_once(':') {
                Some((user, pass)) => (Some(user.to_string()), Some(pass.to_string())),
                None => (Some(info.to_string()), None),
            },
            None => (None, None),
        };

        Some(Self {
            scheme: scheme.to_ascii_lowercase(),
            username,
            password,
            hostname: split_host(host_port)?.to_ascii_lowercase(),
            path: path.to_string(),
            query: query.map(String::from),
            fragment: fragment.map(String::from),
        })
    }

    fn is_loopback(&self) -> bool {
        LOOPBACK_HOSTS.contains(&self.hostname.as_str())
    }
}

/// Split a leading `scheme:` off `input`. Inputs starting with `//` have none.
fn split_scheme(input: &str) -> (&str, &str) {
    let Some((scheme, rest)) = input.split_once(':') else {
        return ("", input);
    };
    let mut chars = scheme.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    if valid { (scheme, rest) } else { ("", input) }
}

fn split_once_opt(input: &str, delimiter: char) -> (&str, Option<&str>) {
    match input.split_once(delimiter) {
        Some((head, tail)) => (head, Some(tail)),
        None => (input, None),
    }
}

/// The host of `host[:port]`, keeping the brackets of an IPv6 literal.
fn split_host(host_port: &str) -> Option<&str> {
    if host_port.starts_with('[') {
        let end = host_port.find(']')?;
        return Some(&host_port[..=end]);
    }
    Some(match host_port.rsplit_once(':') {
        Some((host, _port)) => host,
        None => host_port,
    })
}
