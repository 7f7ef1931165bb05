//! Tables of the credential issuance core.
//!
//! - oidc_client: registered relying parties
//! - oidc_code: single-use authorization codes
//! - oidc_token: access/refresh token pairs
//! - oidc_user_consent: one row per (user, client)
//! - oidc_signing_key: RSA keys stored inline
//! - oidc_signing_key_file: RSA keys stored in the filesystem blob store

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(OidcClient::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OidcClient::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(OidcClient::Secret).string().null())
                    .col(ColumnDef::new(OidcClient::Name).string().not_null())
                    .col(
                        ColumnDef::new(OidcClient::ClientType)
                            .string()
                            .not_null()
                            .default("confidential"),
                    )
                    .col(
                        ColumnDef::new(OidcClient::RedirectUris)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(OidcClient::PostLogoutRedirectUris)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(OidcClient::ResponseTypes)
                            .text()
                            .not_null()
                            .default("code"),
                    )
                    .col(
                        ColumnDef::new(OidcClient::Scopes)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(OidcClient::JwtAlg)
                            .string()
                            .not_null()
                            .default("RS256"),
                    )
                    .col(
                        ColumnDef::new(OidcClient::RequireConsent)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(OidcClient::ReuseConsent)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(OidcClient::RequirePkce)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(OidcClient::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(OidcCode::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OidcCode::Code)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(OidcCode::ClientId).string().not_null())
                    .col(ColumnDef::new(OidcCode::UserId).string().not_null())
                    .col(ColumnDef::new(OidcCode::Scope).text().not_null())
                    .col(ColumnDef::new(OidcCode::Nonce).string().null())
                    .col(
                        ColumnDef::new(OidcCode::IsAuthentication)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(OidcCode::CodeChallenge).string().null())
                    .col(
                        ColumnDef::new(OidcCode::CodeChallengeMethod)
                            .string()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(OidcCode::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OidcCode::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(OidcToken::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OidcToken::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(OidcToken::AccessToken)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(OidcToken::RefreshToken)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(OidcToken::ClientId).string().not_null())
                    .col(ColumnDef::new(OidcToken::UserId).string().null())
                    .col(ColumnDef::new(OidcToken::Scope).text().not_null())
                    .col(
                        ColumnDef::new(OidcToken::IdToken)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(OidcToken::AccessExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OidcToken::IssuedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(OidcUserConsent::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OidcUserConsent::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(OidcUserConsent::UserId).string().not_null())
                    .col(
                        ColumnDef::new(OidcUserConsent::ClientId)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(OidcUserConsent::Scope).text().not_null())
                    .col(
                        ColumnDef::new(OidcUserConsent::DateGiven)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OidcUserConsent::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager.create_table(signing_key_table()).await?;

        manager
            .create_table(
                Table::create()
                    .table(OidcSigningKeyFile::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OidcSigningKeyFile::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(OidcSigningKeyFile::Locator)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(OidcSigningKeyFile::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // Consent upserts conflict on this index.
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_oidc_user_consent_user_client")
                    .table(OidcUserConsent::Table)
                    .col(OidcUserConsent::UserId)
                    .col(OidcUserConsent::ClientId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_oidc_code_expires_at")
                    .table(OidcCode::Table)
                    .col(OidcCode::ExpiresAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_oidc_token_access_expires_at")
                    .table(OidcToken::Table)
                    .col(OidcToken::AccessExpiresAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_oidc_user_consent_expires_at")
                    .table(OidcUserConsent::Table)
                    .col(OidcUserConsent::ExpiresAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for index in [
            "idx_oidc_user_consent_expires_at",
            "idx_oidc_token_access_expires_at",
            "idx_oidc_code_expires_at",
            "idx_oidc_user_consent_user_client",
        ] {
            manager
                .drop_index(Index::drop().name(index).to_owned())
                .await?;
        }

        manager
            .drop_table(Table::drop().table(OidcSigningKeyFile::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(OidcSigningKey::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(OidcUserConsent::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(OidcToken::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(OidcCode::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(OidcClient::Table).to_owned())
            .await?;

        Ok(())
    }
}

/// Key bytes go in an unbounded blob so no backend truncates them.
fn signing_key_table() -> TableCreateStatement {
    Table::create()
        .table(OidcSigningKey::Table)
        .if_not_exists()
        .col(
            ColumnDef::new(OidcSigningKey::Id)
                .string()
                .not_null()
                .primary_key(),
        )
        .col(ColumnDef::new(OidcSigningKey::Key).blob().not_null())
        .col(
            ColumnDef::new(OidcSigningKey::CreatedAt)
                .timestamp_with_time_zone()
                .not_null(),
        )
        .to_owned()
}

#[derive(DeriveIden)]
enum OidcClient {
    Table,
    Id,
    Secret,
    Name,
    ClientType,
    RedirectUris,
    PostLogoutRedirectUris,
    ResponseTypes,
    Scopes,
    JwtAlg,
    RequireConsent,
    ReuseConsent,
    RequirePkce,
    CreatedAt,
}

#[derive(DeriveIden)]
enum OidcCode {
    Table,
    Code,
    ClientId,
    UserId,
    Scope,
    Nonce,
    IsAuthentication,
    CodeChallenge,
    CodeChallengeMethod,
    ExpiresAt,
    CreatedAt,
}

#[derive(DeriveIden)]
enum OidcToken {
    Table,
    Id,
    AccessToken,
    RefreshToken,
    ClientId,
    UserId,
    Scope,
    IdToken,
    AccessExpiresAt,
    IssuedAt,
}

#[derive(DeriveIden)]
enum OidcUserConsent {
    Table,
    Id,
    UserId,
    ClientId,
    Scope,
    DateGiven,
    ExpiresAt,
}

#[derive(DeriveIden)]
enum OidcSigningKey {
    Table,
    Id,
    Key,
    CreatedAt,
}

#[derive(DeriveIden)]
enum OidcSigningKeyFile {
    Table,
    Id,
    Locator,
    CreatedAt,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signing_key_column_has_no_length() {
        let sql = signing_key_table().to_string(SqliteQueryBuilder);
        assert!(sql.contains(r#""key" blob NOT NULL"#), "{sql}");

        let sql = signing_key_table().to_string(PostgresQueryBuilder);
        assert!(sql.contains(r#""key" bytea NOT NULL"#), "{sql}");
    }
}
