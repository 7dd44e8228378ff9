use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use retrosys_di::{
    Arguments, AsyncComponent, Component, DiContainer, DynError, Lifecycle, Parameter,
    Registration, ResolveError, TypeInfo,
};

#[derive(Debug)]
struct Database {
    connected: AtomicBool,
}

async fn connect() -> Result<Database, DynError> {
    tokio::time::sleep(Duration::from_millis(1)).await;
    Ok(Database {
        connected: AtomicBool::new(true),
    })
}

#[derive(Debug)]
struct Repository {
    database: Arc<Database>,
}
impl Component for Repository {
    fn parameters() -> Vec<Parameter> {
        vec![Parameter::of::<Arc<Database>>("database")]
    }

    fn construct(args: &mut Arguments) -> Result<Self, DynError> {
        Ok(Repository {
            database: args.take("database")?,
        })
    }
}

#[tokio::test]
async fn async_factory_needs_the_async_entry_point() {
    let container = DiContainer::new();
    container.register_async_factory(|_| connect(), Lifecycle::Singleton);

    let error = container.resolve::<Database>().unwrap_err();
    assert!(matches!(
        error,
        ResolveError::AsyncInitialization { service, required_by: None }
            if service == TypeInfo::of::<Database>()
    ));

    let database = container.resolve_async::<Database>().await.unwrap();
    assert!(database.connected.load(Ordering::SeqCst));

    // Once cached, the singleton is available without suspending
    let cached = container.resolve::<Database>().unwrap();
    assert!(Arc::ptr_eq(&database, &cached));
}

#[tokio::test]
async fn sync_service_with_async_dependency() {
    let container = DiContainer::new();
    container
        .register(Registration::async_factory(|_| connect()))
        .register(Registration::<Repository>::component().transient());

    let error = container.resolve::<Repository>().unwrap_err();
    assert!(matches!(
        error,
        ResolveError::AsyncInitialization { service, required_by: Some(parent) }
            if service == TypeInfo::of::<Database>() && parent == TypeInfo::of::<Repository>()
    ));

    let repository = container.resolve_async::<Repository>().await.unwrap();
    assert!(repository.database.connected.load(Ordering::SeqCst));
}

#[tokio::test]
async fn asynchronous_flag_is_honoured() {
    let container = DiContainer::new();
    container.register(Registration::factory(|_| Ok(1_u16)).asynchronous(true));

    assert!(container.resolve::<u16>().unwrap_err().is_async_initialization());
    assert_eq!(*container.resolve_async::<u16>().await.unwrap(), 1);
}

#[tokio::test]
async fn async_init_hook_runs_before_the_instance_is_returned() {
    let initialized = Arc::new(AtomicUsize::new(0));
    let container = DiContainer::new();

    let counter = initialized.clone();
    container.register(
        Registration::factory(|_| {
            Ok(Database {
                connected: AtomicBool::new(false),
            })
        })
        .on_init_async(move |database: Arc<Database>| {
            let counter = counter.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(1)).await;
                database.connected.store(true, Ordering::SeqCst);
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }),
    );

    assert!(container.resolve::<Database>().unwrap_err().is_async_initialization());
    assert_eq!(initialized.load(Ordering::SeqCst), 0);

    let database = container.resolve_async::<Database>().await.unwrap();
    assert!(database.connected.load(Ordering::SeqCst));

    container.resolve_async::<Database>().await.unwrap();
    assert_eq!(initialized.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failing_init_hook_does_not_cache() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let container = DiContainer::new();

    let counter = attempts.clone();
    container.register(Registration::factory(|_| Ok(9_i32)).on_init(move |_| {
        match counter.fetch_add(1, Ordering::SeqCst) {
            0 => Err("not ready yet".into()),
            _ => Ok(()),
        }
    }));

    let error = container.resolve_async::<i32>().await.unwrap_err();
    assert!(matches!(
        error,
        ResolveError::HookFailed { ref hook, .. } if hook == "on_init"
    ));

    assert_eq!(*container.resolve_async::<i32>().await.unwrap(), 9);
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

struct Cache {
    database: Arc<Database>,
    size: usize,
}
impl AsyncComponent for Cache {
    fn parameters() -> Vec<Parameter> {
        vec![
            Parameter::of::<Arc<Database>>("database"),
            Parameter::defaulted("size"),
        ]
    }

    async fn construct(mut args: Arguments) -> Result<Self, DynError> {
        tokio::time::sleep(Duration::from_millis(1)).await;
        let size = if args.is_default("size") { 64 } else { 0 };
        Ok(Cache {
            database: args.take("database")?,
            size,
        })
    }
}

#[tokio::test]
async fn async_component_with_sync_dependency() {
    let container = DiContainer::new();
    container
        .register(Registration::factory(|_| {
            Ok(Database {
                connected: AtomicBool::new(true),
            })
        }))
        .register(Registration::<Cache>::async_component());

    let descriptor = &container.descriptors_of::<Cache>()[0];
    assert!(descriptor.is_async());

    let cache = container.resolve_async::<Cache>().await.unwrap();
    assert_eq!(cache.size, 64);
    assert!(Arc::ptr_eq(
        &cache.database,
        &container.resolve::<Database>().unwrap()
    ));
}

#[tokio::test]
async fn async_cycles_are_detected() {
    let container = DiContainer::new();
    container
        .register(Registration::async_factory(|di| async move {
            let number = di.resolve_async::<u64>().await?;
            Ok::<_, DynError>(number.to_string())
        }))
        .register(Registration::async_factory(|di| async move {
            let text = di.resolve_async::<String>().await?;
            Ok::<_, DynError>(text.len() as u64)
        }));

    let error = container.resolve_async::<String>().await.unwrap_err();
    assert!(matches!(
        error,
        ResolveError::CircularDependency { ref chain } if chain.len() == 3
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_async_resolutions_build_the_singleton_once() {
    let built = Arc::new(AtomicUsize::new(0));
    let initialized = Arc::new(AtomicUsize::new(0));
    let container = DiContainer::new();

    let (constructions, inits) = (built.clone(), initialized.clone());
    container.register(
        Registration::<Database>::async_factory(move |_| {
            constructions.fetch_add(1, Ordering::SeqCst);
            async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                connect().await
            }
        })
        .on_init(move |_| {
            inits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }),
    );

    let tasks = (0..8)
        .map(|_| {
            let container = container.clone();
            tokio::spawn(async move { container.resolve_async::<Database>().await.unwrap() })
        })
        .collect::<Vec<_>>();

    let mut resolved = Vec::new();
    for task in tasks {
        resolved.push(task.await.unwrap());
    }

    for database in &resolved {
        assert!(Arc::ptr_eq(database, &resolved[0]));
    }
    assert_eq!(built.load(Ordering::SeqCst), 1);
    assert_eq!(initialized.load(Ordering::SeqCst), 1);
}

#[derive(Debug)]
struct Audit;

#[derive(Debug)]
struct Ledger {
    _audit: Arc<Audit>,
    _database: Arc<Database>,
}
impl Component for Ledger {
    fn parameters() -> Vec<Parameter> {
        vec![
            Parameter::of::<Arc<Audit>>("audit"),
            Parameter::of::<Arc<Database>>("database"),
        ]
    }

    fn construct(args: &mut Arguments) -> Result<Self, DynError> {
        Ok(Ledger {
            _audit: args.take("audit")?,
            _database: args.take("database")?,
        })
    }
}

#[derive(Debug)]
struct Books {
    _ledger: Arc<Ledger>,
}
impl Component for Books {
    fn parameters() -> Vec<Parameter> {
        vec![Parameter::of::<Arc<Ledger>>("ledger")]
    }

    fn construct(args: &mut Arguments) -> Result<Self, DynError> {
        Ok(Books {
            _ledger: args.take("ledger")?,
        })
    }
}

#[tokio::test]
async fn async_service_below_a_sync_dependency_is_not_rebuilt() {
    let audits = Arc::new(AtomicUsize::new(0));
    let container = DiContainer::new();

    let counter = audits.clone();
    container
        .register(
            Registration::factory(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Audit)
            })
            .transient(),
        )
        .register(Registration::async_factory(|_| connect()))
        .register(Registration::<Ledger>::component().transient())
        .register(Registration::<Books>::component().transient());

    let error = container.resolve_async::<Books>().await.unwrap_err();
    assert!(matches!(
        error,
        ResolveError::AsyncInitialization { service, required_by: Some(parent) }
            if service == TypeInfo::of::<Database>() && parent == TypeInfo::of::<Ledger>()
    ));
    assert_eq!(audits.load(Ordering::SeqCst), 1);

    // Resolved directly, the sync constructor may await its async dependency
    container.resolve_async::<Ledger>().await.unwrap();
    assert_eq!(audits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn lazy_handle_resolves_async_targets() {
    let container = DiContainer::new();
    container.register(Registration::async_factory(|_| connect()));

    let lazy = container.lazy_resolve::<Database>("");
    assert!(lazy.invoke().unwrap_err().is_async_initialization());

    let database = lazy.resolve_async().await.unwrap();
    assert!(Arc::ptr_eq(&database, &lazy.invoke().unwrap()));
}
