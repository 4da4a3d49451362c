// ABOUTME: MongoDB client construction for the source and destination servers
// ABOUTME: Applies role-specific read preference and verifies reachability with a ping

use bson::doc;
use mongodb::options::{ClientOptions, Credential, ReadPreference, SelectionCriteria};
use mongodb::Client;

use crate::config::{ConnectionConfig, Credentials};
use crate::error::{ReplayError, Result, ServerRole};

const APP_NAME: &str = "oplog-replicator";

fn to_driver_credential(credentials: &Credentials) -> Credential {
    Credential::builder()
        .username(credentials.username.clone())
        .password(credentials.password.clone())
        .source(credentials.source.clone())
        .build()
}

/// Build client options for a server role without connecting.
///
/// The source reads from any member of its replica set (nearest), so a
/// secondary can serve the oplog. The destination keeps the driver's
/// primary read preference and gets no per-operation time limit: a large
/// `applyOps` must never be cut short.
pub async fn client_options(config: &ConnectionConfig, role: ServerRole) -> Result<ClientOptions> {
    let mut options = ClientOptions::parse(config.uri.as_str())
        .await
        .map_err(|e| ReplayError::connection(role, e))?;

    options.app_name = Some(APP_NAME.to_string());
    if let Some(credentials) = &config.credentials {
        options.credential = Some(to_driver_credential(credentials));
    }
    if role == ServerRole::Source {
        options.selection_criteria = Some(SelectionCriteria::ReadPreference(
            ReadPreference::Nearest {
                options: Default::default(),
            },
        ));
    }

    Ok(options)
}

/// Connect to a server and confirm it answers a `ping`.
///
/// The driver connects lazily, so the ping is what turns an unreachable
/// server into a connection error here rather than deep inside the pipeline.
pub async fn connect(config: &ConnectionConfig, role: ServerRole) -> Result<Client> {
    let options = client_options(config, role).await?;
    let client = Client::with_options(options).map_err(|e| ReplayError::connection(role, e))?;

    client
        .database("admin")
        .run_command(doc! { "ping": 1 })
        .await
        .map_err(|e| ReplayError::connection(role, e))?;

    tracing::debug!(
        "successfully connected to {} server `{}`",
        role,
        config.redacted_uri()
    );
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_source_options_read_from_nearest() {
        let config = ConnectionConfig::new("mongodb://src.example.com:27017/");
        let options = client_options(&config, ServerRole::Source).await.unwrap();
        assert!(matches!(
            options.selection_criteria,
            Some(SelectionCriteria::ReadPreference(ReadPreference::Nearest { .. }))
        ));
        assert_eq!(options.app_name.as_deref(), Some("oplog-replicator"));
    }

    #[tokio::test]
    async fn test_destination_options_keep_default_read_preference() {
        let config = ConnectionConfig::new("mongodb://dst.example.com:27017/");
        let options = client_options(&config, ServerRole::Destination).await.unwrap();
        assert!(options.selection_criteria.is_none());
    }

    #[tokio::test]
    async fn test_credentials_are_applied() {
        let config = ConnectionConfig::new("mongodb://dst.example.com/").with_credentials(Some(
            Credentials {
                username: "replicator".to_string(),
                password: Some("secret".to_string()),
                source: Some("admin".to_string()),
            },
        ));
        let options = client_options(&config, ServerRole::Destination).await.unwrap();
        let credential = options.credential.unwrap();
        assert_eq!(credential.username.as_deref(), Some("replicator"));
        assert_eq!(credential.source.as_deref(), Some("admin"));
    }

    #[tokio::test]
    async fn test_invalid_uri_is_connection_error() {
        let config = ConnectionConfig::new("mongodb://");
        let err = client_options(&config, ServerRole::Source).await.unwrap_err();
        assert!(err.to_string().starts_with("error connecting to source db"));
    }
}
