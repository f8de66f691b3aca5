//! Tests for the salon-sync CLI library module.

use super::*;
use salon_sync_core::SecretString;
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod parsing_tests {
    use super::*;

    #[test]
    fn test_sync_parsing() {
        let cli = Cli::try_parse_from(["salon-sync", "sync", "contacts", "--page-size", "50"])
            .unwrap();

        match cli.command {
            Commands::Sync {
                target,
                page_size,
                format,
            } => {
                assert_eq!(target, SyncTarget::Contacts);
                assert_eq!(page_size, Some(50));
                assert_eq!(format, OutputFormat::Text);
            }
            _ => panic!("Expected Sync command"),
        }
    }

    /// Verify that page sizes beyond the Wix maximum are refused at parse time.
    #[test]
    fn test_page_size_range() {
        assert!(Cli::try_parse_from(["salon-sync", "sync", "all", "--page-size", "101"]).is_err());
        assert!(Cli::try_parse_from(["salon-sync", "sync", "all", "--page-size", "0"]).is_err());
    }

    #[test]
    fn test_config_parsing() {
        let cli = Cli::try_parse_from([
            "salon-sync",
            "config",
            "--file",
            "service.yaml",
            "--show",
            "--format",
            "toml",
        ])
        .unwrap();

        match cli.command {
            Commands::Config { file, show, format } => {
                assert_eq!(file, Some(PathBuf::from("service.yaml")));
                assert!(show);
                assert_eq!(format, ConfigFormat::Toml);
            }
            _ => panic!("Expected Config command"),
        }
    }

    #[test]
    fn test_command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_sync_target_resources() {
        assert_eq!(SyncTarget::Orders.resource(), Some(WixResource::Orders));
        assert_eq!(SyncTarget::All.resource(), None);
    }
}

mod output_tests {
    use super::*;

    /// Verify that the signature matches what the webhook validator expects.
    #[test]
    fn test_sign_payload() {
        let payload = br#"{"id":"b-1"}"#;

        let bare = sign_payload("secret", payload, false).unwrap();
        let prefixed = sign_payload("secret", payload, true).unwrap();

        assert_eq!(bare, compute_signature("secret", payload).unwrap());
        assert_eq!(bare.len(), 64);
        assert_eq!(prefixed, format!("sha256={}", bare));
    }

    #[test]
    fn test_sign_requires_secret() {
        let error = sign_payload("", b"{}", false).unwrap_err();
        assert_eq!(error.exit_code(), 4);
    }

    /// Verify that every output format redacts secrets.
    #[test]
    fn test_render_config_redacts_secrets() {
        let mut config = ServiceConfig::default();
        config.webhooks.secret = SecretString::new("hook-secret");

        for format in [ConfigFormat::Yaml, ConfigFormat::Json, ConfigFormat::Toml] {
            let rendered = render_config(&config, &format).unwrap();
            assert!(!rendered.contains("hook-secret"), "{format:?} leaked the secret");
            assert!(rendered.contains("<REDACTED>"));
            assert!(rendered.contains("webhook-router"));
        }
    }

    #[test]
    fn test_render_sync_reports() {
        let report = SyncReport {
            pages: 2,
            fetched: 150,
            written: 149,
            skipped: 1,
        };
        let reports = vec![(WixResource::Contacts, report)];

        let text = render_sync_reports(&reports, &OutputFormat::Text).unwrap();
        assert_eq!(text, "contacts: 2 pages, 150 fetched, 149 written, 1 skipped");

        let parsed: serde_json::Value =
            serde_json::from_str(&render_sync_reports(&reports, &OutputFormat::Json).unwrap())
                .unwrap();
        assert_eq!(parsed[0]["resource"], json!("contacts"));
        assert_eq!(parsed[0]["written"], json!(149));
    }
}

mod config_path_tests {
    use super::*;

    #[test]
    fn test_command_file_wins() {
        let resolved = resolve_config_path(
            Some(Path::new("command.yaml")),
            Some(Path::new("global.yaml")),
        );
        assert_eq!(resolved, Some(PathBuf::from("command.yaml")));

        let resolved = resolve_config_path(None, Some(Path::new("global.yaml")));
        assert_eq!(resolved, Some(PathBuf::from("global.yaml")));
    }

    #[test]
    fn test_user_config_path_location() {
        if let Some(path) = user_config_path() {
            assert!(path.ends_with("salon-sync/config.yaml"));
        }
    }
}

mod sync_tests {
    use super::*;

    fn config_for(server: &MockServer) -> ServiceConfig {
        let mut config = ServiceConfig::default();
        config.wix.api_base_url = server.uri();
        config.wix.token = SecretString::new("wix-token");
        config.wix.max_retries = 0;
        config.datastore.url = Some(server.uri());
        config.datastore.service_key = SecretString::new("service-key");
        config
    }

    /// Verify that a sync pages Wix and batch-upserts into PostgREST.
    #[tokio::test]
    async fn test_sync_contacts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/contacts/v1/contacts/query"))
            .and(header("authorization", "Bearer wix-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "contacts": [
                    { "id": "c1", "info": { "name": { "first": "Ana", "last": "Lopez" } } },
                    { "id": "c2", "info": { "name": { "first": "Bea", "last": "Ruiz" } } }
                ],
                "pagingMetadata": { "cursors": {} }
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/contacts"))
            .and(query_param("on_conflict", "wix_contact_id"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let reports = sync(&config_for(&server), SyncTarget::Contacts, None)
            .await
            .unwrap();

        assert_eq!(reports.len(), 1);
        let (resource, report) = reports[0];
        assert_eq!(resource, WixResource::Contacts);
        assert_eq!(report.pages, 1);
        assert_eq!(report.fetched, 2);
        assert_eq!(report.written, 2);
    }

    #[tokio::test]
    async fn test_sync_requires_datastore() {
        let server = MockServer::start().await;
        let mut config = config_for(&server);
        config.datastore.url = None;

        let error = sync(&config, SyncTarget::All, None).await.unwrap_err();

        assert!(matches!(
            error,
            CliError::Configuration(ConfigError::Missing { ref key }) if key == "datastore.url"
        ));
        assert_eq!(error.exit_code(), 3);
    }

    #[tokio::test]
    async fn test_sync_requires_token() {
        let server = MockServer::start().await;
        let mut config = config_for(&server);
        config.wix.token = SecretString::default();

        let error = sync(&config, SyncTarget::Bookings, None).await.unwrap_err();

        assert!(matches!(
            error,
            CliError::Configuration(ConfigError::Missing { ref key }) if key == "wix.token"
        ));
    }

    /// Verify that an authentication failure aborts the run.
    #[tokio::test]
    async fn test_sync_api_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bookings/v1/bookings/query"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let error = sync(&config_for(&server), SyncTarget::Bookings, None)
            .await
            .unwrap_err();

        assert!(matches!(error, CliError::Sync(SyncError::Api { .. })));
        assert_eq!(error.exit_code(), 2);
    }

    #[tokio::test]
    async fn test_check_datastore() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        assert!(check_datastore(&config_for(&server)).await.is_ok());
    }
}
