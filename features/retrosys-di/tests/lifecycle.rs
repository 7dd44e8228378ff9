use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use retrosys_di::{
    Arguments, Component, DiContainer, DynError, Lifecycle, Parameter, Registration,
};

#[derive(Default)]
struct Logger {
    prefix: String,
}

struct Service {
    logger: Arc<Logger>,
}
impl Component for Service {
    fn parameters() -> Vec<Parameter> {
        vec![Parameter::of::<Arc<Logger>>("logger")]
    }

    fn construct(args: &mut Arguments) -> Result<Self, DynError> {
        Ok(Service {
            logger: args.take("logger")?,
        })
    }
}

fn counting_logger(counter: Arc<AtomicUsize>, prefix: &'static str) -> Registration<Logger> {
    Registration::factory(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(Logger {
            prefix: prefix.to_string(),
        })
    })
}

#[test]
fn singleton_is_built_once() {
    let built = Arc::new(AtomicUsize::new(0));
    let container = DiContainer::new();
    container.register(counting_logger(built.clone(), "app"));

    let first = container.resolve::<Logger>().unwrap();
    let second = container.resolve::<Logger>().unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(built.load(Ordering::SeqCst), 1);
}

#[test]
fn transient_is_built_every_time() {
    let built = Arc::new(AtomicUsize::new(0));
    let container = DiContainer::new();
    container.register(counting_logger(built.clone(), "app").transient());

    let first = container.resolve::<Logger>().unwrap();
    let second = container.resolve::<Logger>().unwrap();

    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(built.load(Ordering::SeqCst), 2);
}

#[test]
fn transient_service_shares_singleton_dependency() {
    let container = DiContainer::new();
    container
        .register_factory(|_| Ok(Logger::default()), Lifecycle::Singleton)
        .register_component::<Service>(Lifecycle::Transient);

    let first = container.resolve::<Service>().unwrap();
    let second = container.resolve::<Service>().unwrap();

    assert!(!Arc::ptr_eq(&first, &second));
    assert!(Arc::ptr_eq(&first.logger, &second.logger));
}

#[test]
fn registered_instance_is_returned_as_is() {
    let logger = Arc::new(Logger {
        prefix: "pre-built".to_string(),
    });
    let container = DiContainer::new();
    container.register_instance(logger.clone());

    assert!(Arc::ptr_eq(&container.resolve::<Logger>().unwrap(), &logger));

    let descriptor = &container.descriptors_of::<Logger>()[0];
    assert_eq!(descriptor.lifecycle(), Lifecycle::Singleton);
    assert!(descriptor.cached_instance().is_some());
}

#[test]
fn scoped_outside_a_scope_is_not_cached() {
    let built = Arc::new(AtomicUsize::new(0));
    let container = DiContainer::new();
    container.register(counting_logger(built.clone(), "app").scoped());

    container.resolve::<Logger>().unwrap();
    container.resolve::<Logger>().unwrap();

    assert_eq!(built.load(Ordering::SeqCst), 2);
}

#[test]
fn context_key_selects_registration() {
    let container = DiContainer::new();
    container
        .register(counting_logger(Default::default(), "default"))
        .register(counting_logger(Default::default(), "alt").context_key("alt"));

    assert_eq!(container.resolve::<Logger>().unwrap().prefix, "default");
    assert_eq!(container.resolve_keyed::<Logger>("alt").unwrap().prefix, "alt");
    // Unknown keys fall back to the first registration
    assert_eq!(container.resolve_keyed::<Logger>("other").unwrap().prefix, "default");
    assert_eq!(container.descriptors_of::<Logger>().len(), 2);
}

#[test]
fn keyed_constructor_parameter() {
    let container = DiContainer::new();
    container
        .register(counting_logger(Default::default(), "default"))
        .register(counting_logger(Default::default(), "alt").context_key("alt"))
        .register(Registration::constructor(
            vec![Parameter::keyed::<Arc<Logger>>("logger", "alt")],
            |args: &mut Arguments| -> Result<Service, DynError> {
                Ok(Service {
                    logger: args.take("logger")?,
                })
            },
        ));

    assert_eq!(container.resolve::<Service>().unwrap().logger.prefix, "alt");
}

#[test]
fn child_container_shares_cached_singletons() {
    let built = Arc::new(AtomicUsize::new(0));
    let container = DiContainer::new();
    container.register(counting_logger(built.clone(), "app"));

    let from_parent = container.resolve::<Logger>().unwrap();
    let child = container.create_child_container();
    let from_child = child.resolve::<Logger>().unwrap();

    assert!(Arc::ptr_eq(&from_parent, &from_child));
    assert_eq!(built.load(Ordering::SeqCst), 1);

    // Registrations made afterwards stay local
    child.register_instance(Arc::new(42_u32));
    assert!(child.is_registered::<u32>());
    assert!(!container.is_registered::<u32>());
}

#[tokio::test]
async fn dispose_tears_down_cached_singletons() {
    let destroyed = Arc::new(AtomicUsize::new(0));
    let container = DiContainer::new();

    let counter = destroyed.clone();
    container
        .register(
            Registration::factory(|_| Ok(Logger::default())).on_destroy(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        )
        .register(
            Registration::factory(|_| Ok(7_u64)).on_destroy(|_| Err("flush failed".into())),
        );

    let first = container.resolve::<Logger>().unwrap();
    container.resolve::<u64>().unwrap();

    // A failing teardown does not stop the others
    container.dispose().await;
    assert_eq!(destroyed.load(Ordering::SeqCst), 1);

    // Only once per instance
    container.dispose().await;
    assert_eq!(destroyed.load(Ordering::SeqCst), 1);

    let second = container.resolve::<Logger>().unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
}

#[test]
fn singleton_service_with_singleton_dependency() {
    let container = DiContainer::new();
    container
        .register(counting_logger(Default::default(), "first"))
        .register(Registration::<Service>::component());

    let service = container.resolve::<Service>().unwrap();
    let again = container.resolve::<Service>().unwrap();

    assert!(Arc::ptr_eq(&service, &again));
    assert!(Arc::ptr_eq(&service.logger, &again.logger));
}

#[test]
fn unkeyed_dependency_ignores_keyed_registrations() {
    let container = DiContainer::new();
    container
        .register(counting_logger(Default::default(), "first"))
        .register(counting_logger(Default::default(), "alt").context_key("alt"))
        .register(Registration::<Service>::component());

    let service = container.resolve::<Service>().unwrap();
    assert_eq!(service.logger.prefix, "first");
    assert_eq!(container.resolve_keyed::<Logger>("alt").unwrap().prefix, "alt");
}
