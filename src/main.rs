use std::{future::IntoFuture, process, sync::Arc};

use serde_json::json;
use soffio_kv::{
    application::{admin::AdminStoreService, error::AppError},
    config::{self, Command, KeyArgs, NamespaceArgs, PatternArgs, SetArgs},
    domain::{BackendKind, Namespace, Value},
    infra::{
        db::PostgresKv,
        error::InfraError,
        http::{self, AdminState},
        objects::{FsObjectStore, ObjectStore},
        telemetry,
    },
    store::{BackendRegistry, RequestStores, Store, StoreFactory},
};
use tokio::sync::oneshot;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_max_level(Level::ERROR)
        .with_writer(std::io::stderr)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli().map_err(|err| {
        AppError::from(InfraError::configuration(format!(
            "failed to load configuration: {err}"
        )))
    })?;

    let command = cli_args
        .command
        .unwrap_or(Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        Command::Serve(_) => run_serve(settings).await,
        Command::Migrate(_) => run_migrate(settings).await,
        Command::Get(args) => run_get(settings, args).await,
        Command::Set(args) => run_set(settings, args).await,
        Command::Delete(args) => run_delete(settings, args).await,
        Command::DeletePrefix(args) => run_delete_prefix(settings, args).await,
        Command::Suffix(args) => run_suffix(settings, args).await,
        Command::List(args) => run_list(settings, args).await,
        Command::Clear(args) => run_clear(settings, args).await,
    }
}

struct StoreContext {
    factory: Arc<dyn StoreFactory>,
    db: Option<PostgresKv>,
}

/// Connect whatever backends the namespace bindings need and build the registry.
async fn init_stores(settings: &config::Settings) -> Result<StoreContext, AppError> {
    let needs_database = settings
        .namespaces
        .iter()
        .any(|binding| binding.backend == BackendKind::Relational);

    let db = match (settings.database.url.as_ref(), needs_database) {
        (Some(url), true) => Some(connect_database(settings, url).await?),
        (None, true) => {
            return Err(AppError::from(InfraError::configuration(
                "database url is not configured but a namespace is bound to relational storage",
            )));
        }
        (_, false) => None,
    };

    let objects: Arc<dyn ObjectStore> = Arc::new(
        FsObjectStore::new(settings.objects.directory.clone()).map_err(InfraError::from)?,
    );
    let registry = BackendRegistry::new(
        settings.namespaces.iter().cloned(),
        db.clone(),
        objects,
        settings.objects.prefix.clone(),
    )?;

    info!(
        target = "soffio_kv::bootstrap",
        namespaces = ?registry.bindings(),
        objects = %settings.objects.directory.display(),
        "store registry ready"
    );

    Ok(StoreContext {
        factory: Arc::new(registry),
        db,
    })
}

async fn connect_database(settings: &config::Settings, url: &str) -> Result<PostgresKv, AppError> {
    let pool = PostgresKv::connect(url, settings.database.max_connections.get())
        .await
        .map_err(InfraError::from)?;
    PostgresKv::run_migrations(&pool)
        .await
        .map_err(InfraError::from)?;
    Ok(PostgresKv::new(pool))
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let context = init_stores(&settings).await?;
    let state = AdminState {
        factory: context.factory,
        admin: Arc::new(AdminStoreService::new(&settings.admin)),
        db: context.db,
    };
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(InfraError::from)?;
    info!(
        target = "soffio_kv::bootstrap",
        addr = %settings.server.addr,
        "listening"
    );

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move {
            let _ = stop_rx.await;
        })
        .into_future();
    let mut server = tokio::spawn(server);

    tokio::select! {
        joined = &mut server => return server_outcome(joined),
        _ = shutdown_signal() => {}
    }

    info!(
        target = "soffio_kv::bootstrap",
        grace_seconds = settings.server.graceful_shutdown.as_secs(),
        "shutdown requested; draining connections"
    );
    let _ = stop_tx.send(());

    match tokio::time::timeout(settings.server.graceful_shutdown, server).await {
        Ok(joined) => server_outcome(joined),
        Err(_) => {
            warn!(
                target = "soffio_kv::bootstrap",
                "graceful shutdown timed out; exiting with connections open"
            );
            Ok(())
        }
    }
}

fn server_outcome(
    joined: Result<std::io::Result<()>, tokio::task::JoinError>,
) -> Result<(), AppError> {
    match joined {
        Ok(result) => result.map_err(|err| AppError::from(InfraError::from(err))),
        Err(err) => Err(AppError::unexpected(format!("server task failed: {err}"))),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(target = "soffio_kv::bootstrap", error = %err, "ctrl-c handler failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(target = "soffio_kv::bootstrap", error = %err, "SIGTERM handler failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    let url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))?;
    connect_database(&settings, url).await?;
    info!(target = "soffio_kv::migrate", "migrations applied");
    print_json(&json!({ "migrated": true }))
}

async fn open_store(
    settings: &config::Settings,
    target: &NamespaceArgs,
) -> Result<Arc<Store>, AppError> {
    let namespace = Namespace::new(target.namespace.as_str())?;
    let context = init_stores(settings).await?;
    let stores = RequestStores::new(context.factory);
    Ok(stores.store(&namespace).await?)
}

async fn run_get(settings: config::Settings, args: KeyArgs) -> Result<(), AppError> {
    let admin = AdminStoreService::new(&settings.admin);
    let namespace = Namespace::new(args.target.namespace.as_str())?;
    let context = init_stores(&settings).await?;
    let stores = RequestStores::new(context.factory);
    let value = admin.lookup(&stores, &namespace, &args.key).await?;
    print_json(&json!({
        "namespace": namespace,
        "key": args.key,
        "value": value,
    }))
}

async fn run_set(settings: config::Settings, args: SetArgs) -> Result<(), AppError> {
    let value: Value = serde_json::from_str(&args.value)
        .map_err(|err| AppError::validation(format!("value is not valid JSON: {err}")))?;
    let store = open_store(&settings, &args.target).await?;

    if args.deferred {
        store.set_deferred(&args.key, value)?;
        store.save().await?;
    } else {
        store.set(&args.key, value).await?;
    }
    print_json(&json!({
        "namespace": store.namespace(),
        "key": args.key,
        "stored": true,
    }))
}

async fn run_delete(settings: config::Settings, args: KeyArgs) -> Result<(), AppError> {
    let store = open_store(&settings, &args.target).await?;
    store.delete(&args.key).await?;
    print_json(&json!({
        "namespace": store.namespace(),
        "key": args.key,
        "deleted": true,
    }))
}

async fn run_delete_prefix(settings: config::Settings, args: PatternArgs) -> Result<(), AppError> {
    let store = open_store(&settings, &args.target).await?;
    let removed = store.delete_prefix(&args.pattern).await?;
    print_json(&json!({
        "namespace": store.namespace(),
        "prefix": args.pattern,
        "removed": removed,
    }))
}

async fn run_suffix(settings: config::Settings, args: PatternArgs) -> Result<(), AppError> {
    let admin = AdminStoreService::new(&settings.admin);
    let namespace = Namespace::new(args.target.namespace.as_str())?;
    let context = init_stores(&settings).await?;
    let stores = RequestStores::new(context.factory);
    let entries = admin
        .lookup_suffix(&stores, &namespace, &args.pattern)
        .await?;
    print_json(&json!({
        "namespace": namespace,
        "suffix": args.pattern,
        "values": entries.into_values().collect::<Vec<_>>(),
    }))
}

async fn run_list(settings: config::Settings, args: NamespaceArgs) -> Result<(), AppError> {
    let admin = AdminStoreService::new(&settings.admin);
    let namespace = Namespace::new(args.namespace.as_str())?;
    let context = init_stores(&settings).await?;
    let stores = RequestStores::new(context.factory);
    let entries = admin.list_namespace(&stores, &namespace).await?;
    print_json(&json!({
        "namespace": namespace,
        "entries": entries,
    }))
}

async fn run_clear(settings: config::Settings, args: NamespaceArgs) -> Result<(), AppError> {
    let store = open_store(&settings, &args).await?;
    let removed = store.clear().await?;
    print_json(&json!({
        "namespace": store.namespace(),
        "removed": removed,
    }))
}

fn print_json(value: &serde_json::Value) -> Result<(), AppError> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::unexpected(format!("failed to render output: {err}")))?;
    println!("{rendered}");
    Ok(())
}
