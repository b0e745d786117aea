use super::*;

#[test]
fn defaults_are_valid() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.server.addr.port(), DEFAULT_PORT);
    assert_eq!(settings.server.graceful_shutdown, Duration::from_secs(30));
    assert_eq!(settings.database.url, None);
    assert_eq!(settings.database.max_connections.get(), 8);
    assert_eq!(settings.objects.prefix, "kv");
    assert_eq!(settings.namespaces, NamespaceBinding::defaults());
    assert_eq!(settings.admin.cache_namespace, Namespace::cache());
    assert!(
        settings
            .admin
            .sensitive_fields
            .iter()
            .any(|field| field == "ai.api_key")
    );
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.server.port = Some(4000);
    raw.logging.level = Some("info".to_string());

    let overrides = ServeOverrides {
        server_port: Some(4321),
        log_level: Some("debug".to_string()),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = ServeOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn blank_database_url_is_treated_as_absent() {
    let mut raw = RawSettings::default();
    raw.database.url = Some("   ".to_string());

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert!(settings.database.url.is_none());
}

#[test]
fn zero_port_is_rejected() {
    let mut raw = RawSettings::default();
    raw.server.port = Some(0);

    let err = Settings::from_raw(raw).expect_err("zero port");
    assert!(matches!(err, LoadError::Invalid { key: "server.port", .. }));
}

#[test]
fn secret_namespace_on_object_storage_is_rejected() {
    let mut raw = RawSettings::default();
    raw.namespaces = Some(vec![
        RawNamespaceBinding {
            name: Some("cache".to_string()),
            backend: Some("object".to_string()),
            secret: None,
        },
        RawNamespaceBinding {
            name: Some("server.config".to_string()),
            backend: Some("object".to_string()),
            secret: Some(true),
        },
    ]);

    let err = Settings::from_raw(raw).expect_err("secret placement");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "namespaces.backend",
            ..
        }
    ));
}

#[test]
fn duplicate_namespaces_are_rejected() {
    let mut raw = RawSettings::default();
    let cache = RawNamespaceBinding {
        name: Some("cache".to_string()),
        backend: Some("object".to_string()),
        secret: None,
    };
    raw.namespaces = Some(vec![cache.clone(), cache]);

    let err = Settings::from_raw(raw).expect_err("duplicate");
    assert!(matches!(err, LoadError::Invalid { key: "namespaces.name", .. }));
}

#[test]
fn namespace_backend_defaults_to_relational() {
    let mut raw = RawSettings::default();
    raw.namespaces = Some(vec![RawNamespaceBinding {
        name: Some("cache".to_string()),
        backend: None,
        secret: None,
    }]);

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.namespaces[0].backend, BackendKind::Relational);
}

#[test]
fn cache_namespace_must_be_configured_and_not_secret() {
    let mut raw = RawSettings::default();
    raw.admin.cache_namespace = Some("volatile".to_string());
    let err = Settings::from_raw(raw).expect_err("unknown cache namespace");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "admin.cache_namespace",
            ..
        }
    ));

    let mut raw = RawSettings::default();
    raw.admin.cache_namespace = Some("server.config".to_string());
    let err = Settings::from_raw(raw).expect_err("secret cache namespace");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "admin.cache_namespace",
            ..
        }
    ));
}

#[test]
fn object_prefix_is_normalised() {
    let mut raw = RawSettings::default();
    raw.objects.prefix = Some("/blobs/kv/".to_string());
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.objects.prefix, "blobs/kv");

    let mut raw = RawSettings::default();
    raw.objects.prefix = Some("../kv".to_string());
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn default_to_serve_command() {
    let args = CliArgs::parse_from(["soffio-kv"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
fn parse_set_arguments() {
    let args = CliArgs::parse_from([
        "soffio-kv",
        "set",
        "--database-url",
        "postgres://example",
        "client.config",
        "site.title",
        "\"Soffio\"",
        "--deferred",
    ]);

    match args.command.expect("set command") {
        Command::Set(set) => {
            assert_eq!(
                set.target.overrides.database_url.as_deref(),
                Some("postgres://example")
            );
            assert_eq!(set.target.namespace, "client.config");
            assert_eq!(set.key, "site.title");
            assert_eq!(set.value, "\"Soffio\"");
            assert!(set.deferred);
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_delete_prefix_arguments() {
    let args = CliArgs::parse_from([
        "soffio-kv",
        "delete-prefix",
        "--objects-directory",
        "/var/lib/soffio/objects",
        "cache",
        "feeds_",
    ]);

    let command = args.command.expect("delete-prefix command");
    assert_eq!(
        command.store_overrides().objects_directory.as_deref(),
        Some(std::path::Path::new("/var/lib/soffio/objects"))
    );
    match command {
        Command::DeletePrefix(pattern) => {
            assert_eq!(pattern.target.namespace, "cache");
            assert_eq!(pattern.pattern, "feeds_");
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn store_overrides_apply_to_non_serve_commands() {
    let mut raw = RawSettings::default();
    raw.apply_store_overrides(&StoreOverrides {
        database_url: Some("postgres://override".to_string()),
        objects_directory: Some(PathBuf::from("/tmp/objects")),
    });

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.database.url.as_deref(), Some("postgres://override"));
    assert_eq!(settings.objects.directory, PathBuf::from("/tmp/objects"));
}
