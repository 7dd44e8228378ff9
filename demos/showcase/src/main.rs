use std::{error::Error, sync::Arc};

use retrosys_config::{provider::register_config_provider, Config, ConfigProvider};
use retrosys_di::{
    Arguments, AsyncDispose, Component, DiContainer, DynError, Lazy, Module, Parameter,
    Registration,
};
use tracing_subscriber::EnvFilter;

struct Logger {
    name: &'static str,
}
impl Logger {
    fn log(&self, message: &str) {
        tracing::info!(logger = self.name, "{message}");
    }
}

struct AppConfig {
    greeting: String,
}

struct Service {
    logger: Arc<Logger>,
    greeting: String,
    audit: Lazy<AuditLog>,
}
impl Component for Service {
    fn parameters() -> Vec<Parameter> {
        vec![
            Parameter::of::<Arc<Logger>>("logger"),
            Parameter::of::<Config<AppConfig>>("config"),
            Parameter::of::<Lazy<AuditLog>>("audit"),
        ]
    }

    fn construct(args: &mut Arguments) -> Result<Self, DynError> {
        let config: Config<AppConfig> = args.take("config")?;
        Ok(Service {
            logger: args.take("logger")?,
            greeting: config.greeting.clone(),
            audit: args.take("audit")?,
        })
    }
}
impl Service {
    fn greet(&self, user: &str) -> Result<(), DynError> {
        self.logger.log(&format!("{} {user}", self.greeting));
        self.audit.invoke()?.record(user);
        Ok(())
    }
}

#[derive(Default)]
struct AuditLog;
impl AuditLog {
    fn record(&self, user: &str) {
        tracing::info!("audit: greeted {user}");
    }
}

struct RequestContext {
    id: u32,
}
impl AsyncDispose for RequestContext {
    async fn dispose(&self) -> Result<(), DynError> {
        tracing::info!("request {} finished", self.id);
        Ok(())
    }
}

fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut config = ConfigProvider::new();
    config.add_config(AppConfig {
        greeting: "Hello".to_string(),
    })?;

    let audit = Module::new("audit");
    audit.register(Registration::factory(|_| Ok(AuditLog)));

    let container = DiContainer::new();
    register_config_provider(&container, config);
    container
        .register_module(&audit, "audit")
        .register(Registration::factory(|_| Ok(Logger { name: "main" })))
        .register(Registration::factory(|_| Ok(Logger { name: "alt" })).context_key("alt"))
        .register(Registration::<Service>::component().transient())
        .register(
            Registration::<RequestContext>::async_factory(|_| async {
                Ok(RequestContext { id: 1 })
            })
            .scoped()
            .async_disposable(),
        );

    if let Err(errors) = container.dependency_graph().check() {
        tracing::warn!("{errors}");
    }

    let service = container.resolve::<Service>()?;
    service.greet("world")?;

    let alt = container.resolve_keyed::<Logger>("alt")?;
    alt.log("resolved with context key 'alt'");

    futures::executor::block_on(async {
        let scope = container.create_scope();
        let request = scope.resolve_async::<RequestContext>().await?;
        tracing::info!("handling request {}", request.id);
        scope.dispose().await;
        container.dispose().await;
        Ok::<_, Box<dyn Error + Send + Sync>>(())
    })
}
