//! SeaORM entities for every table owned by the issuer.
//!
//! Multi-valued attributes are stored as joined text. The helpers below are the
//! only place that joins or splits them; domain types carry `Vec<String>`.

pub mod oidc_client;
pub mod oidc_code;
pub mod oidc_signing_key;
pub mod oidc_signing_key_file;
pub mod oidc_token;
pub mod oidc_user_consent;

/// Split a space-separated scope string.
pub fn split_scope(scope: &str) -> Vec<String> {
    scope.split_whitespace().map(String::from).collect()
}

pub fn join_scope(scope: &[String]) -> String {
    scope.join(" ")
}

/// Split newline-separated text (redirect URIs, response types). Blank lines are dropped.
pub fn split_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}

pub fn join_lines(values: &[String]) -> String {
    values.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_split_ignores_extra_whitespace() {
        assert_eq!(split_scope("  openid   email\tprofile "), vec!["openid", "email", "profile"]);
        assert!(split_scope("").is_empty());
    }

    #[test]
    fn lines_keep_order_and_inner_spaces() {
        let text = "code\ncode id_token\r\n\nid_token token";
        assert_eq!(split_lines(text), vec!["code", "code id_token", "id_token token"]);
        let joined = join_lines(&split_lines(text));
        assert_eq!(joined, "code\ncode id_token\nid_token token");
    }
}
