use std::{
    panic::AssertUnwindSafe,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use futures::FutureExt;
use parking_lot::Mutex;
use retrosys_di::{
    AsyncDispose, DiContainer, Dispose, DynError, Registration, ResolveError,
};

type Journal = Arc<Mutex<Vec<String>>>;

struct Connection {
    name: &'static str,
    journal: Journal,
}
impl Dispose for Connection {
    fn dispose(&self) -> Result<(), DynError> {
        self.journal.lock().push(format!("close {}", self.name));
        Ok(())
    }
}

struct Transaction {
    journal: Journal,
}
impl AsyncDispose for Transaction {
    async fn dispose(&self) -> Result<(), DynError> {
        self.journal.lock().push("rollback".to_string());
        Err("rollback failed".into())
    }
}

struct Session {
    journal: Journal,
}

fn container(journal: &Journal) -> DiContainer {
    let container = DiContainer::new();

    let for_connection = journal.clone();
    let for_transaction = journal.clone();
    let for_session = journal.clone();
    container
        .register(
            Registration::<Connection>::factory(move |_| {
                Ok(Connection {
                    name: "primary",
                    journal: for_connection.clone(),
                })
            })
            .scoped()
            .disposable(),
        )
        .register(
            Registration::<Transaction>::factory(move |_| {
                Ok(Transaction {
                    journal: for_transaction.clone(),
                })
            })
            .scoped()
            .async_disposable(),
        )
        .register(
            Registration::<Session>::factory(move |_| {
                Ok(Session {
                    journal: for_session.clone(),
                })
            })
            .scoped()
            .on_destroy(|session| {
                session.journal.lock().push("end session".to_string());
                Ok(())
            }),
        );
    container
}

#[tokio::test]
async fn scoped_instances_are_shared_within_a_scope_only() {
    let journal = Journal::default();
    let container = container(&journal);

    let first = container.create_scope();
    let second = container.create_scope();

    let a = first.resolve::<Connection>().unwrap();
    let b = first.resolve::<Connection>().unwrap();
    let c = second.resolve::<Connection>().unwrap();

    assert!(Arc::ptr_eq(&a, &b));
    assert!(!Arc::ptr_eq(&a, &c));
    assert_eq!(first.len(), 1);

    first.dispose().await;
    second.dispose().await;
}

#[tokio::test]
async fn dispose_runs_in_reverse_creation_order_and_survives_failures() {
    let journal = Journal::default();
    let container = container(&journal);
    let scope = container.create_scope();

    scope.resolve::<Connection>().unwrap();
    scope.resolve::<Transaction>().unwrap();
    scope.resolve_async::<Session>().await.unwrap();

    scope.dispose().await;

    assert_eq!(
        *journal.lock(),
        vec!["end session", "rollback", "close primary"]
    );
    assert!(scope.is_disposed());
    assert!(scope.is_empty());

    // Disposal happens exactly once
    scope.dispose().await;
    assert_eq!(journal.lock().len(), 3);

    assert!(matches!(
        scope.resolve::<Connection>(),
        Err(ResolveError::ScopeClosed)
    ));
}

#[tokio::test]
async fn run_disposes_on_error() {
    let journal = Journal::default();
    let container = container(&journal);

    let result = container
        .create_scope()
        .run(|scope| async move {
            scope.resolve::<Connection>()?;
            scope.resolve::<u8>()?;
            Ok::<_, ResolveError>(())
        })
        .await;

    assert!(result.unwrap_err().is_not_found());
    assert_eq!(*journal.lock(), vec!["close primary"]);
}

#[tokio::test]
async fn run_disposes_async_teardowns_when_the_body_panics() {
    let journal = Journal::default();
    let container = container(&journal);

    let outcome = AssertUnwindSafe(container.create_scope().run(|scope| async move {
        scope.resolve::<Connection>().unwrap();
        scope.resolve::<Transaction>().unwrap();
        panic!("handler crashed");
    }))
    .catch_unwind()
    .await;

    assert!(outcome.is_err());
    assert_eq!(*journal.lock(), vec!["rollback", "close primary"]);
}

#[test]
fn close_blocks_on_async_teardown() {
    let journal = Journal::default();
    let container = container(&journal);
    let scope = container.create_scope();

    scope.resolve::<Transaction>().unwrap();
    scope.close();

    assert_eq!(*journal.lock(), vec!["rollback"]);
}

#[test]
fn drop_runs_sync_teardown_only() {
    let journal = Journal::default();
    let container = container(&journal);

    {
        let scope = container.create_scope();
        scope.resolve::<Connection>().unwrap();
        scope.resolve::<Transaction>().unwrap();
    }

    assert_eq!(*journal.lock(), vec!["close primary"]);
}

#[tokio::test]
async fn singletons_are_shared_with_scopes_and_outlive_them() {
    let built = Arc::new(AtomicUsize::new(0));
    let container = DiContainer::new();

    let counter = built.clone();
    container.register(Registration::factory(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(String::from("config"))
    }));

    let from_container = container.resolve::<String>().unwrap();
    let scope = container.create_scope();
    let from_scope = scope.resolve::<String>().unwrap();
    scope.dispose().await;

    assert!(Arc::ptr_eq(&from_container, &from_scope));
    assert_eq!(built.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn scoped_dependencies_of_transients_come_from_the_scope() {
    struct Handler {
        connection: Arc<Connection>,
    }

    let journal = Journal::default();
    let container = container(&journal);
    container.register(
        Registration::factory(|di| {
            Ok(Handler {
                connection: di.resolve::<Connection>()?,
            })
        })
        .transient(),
    );

    let scope = container.create_scope();
    let first = scope.resolve::<Handler>().unwrap();
    let second = scope.resolve::<Handler>().unwrap();

    assert!(!Arc::ptr_eq(&first, &second));
    assert!(Arc::ptr_eq(&first.connection, &second.connection));
    scope.dispose().await;
}
