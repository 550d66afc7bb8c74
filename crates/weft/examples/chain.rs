//! Transitive wiring demo
//!
//! Three components registered in reverse dependency order: the client
//! first, then an asynchronously-activating service, then the root
//! provider. Registering the root resolves the whole chain; unregistering
//! the middle service cascades the teardown without touching the client.
//!
//! Run with `WEFT_LOG=debug cargo run --example chain` to watch the engine.

use std::rc::Rc;

use anyhow::Result;
use tracing::info;
use weft::{init_logging, Component, Context, ContractBuilder};

struct ServiceA;

impl Component for ServiceA {
    fn contract(builder: &mut ContractBuilder<Self>) {
        builder
            .provides::<ServiceA>(|me| me)
            .on_activate::<(), _>(|_me, ()| {
                info!("service A up");
                Ok(())
            })
            .on_deactivate(|_me| info!("service A down"));
    }
}

struct ServiceB;

impl Component for ServiceB {
    fn contract(builder: &mut ContractBuilder<Self>) {
        builder
            .provides::<ServiceB>(|me| me)
            .on_activate_async::<Rc<ServiceA>, _, _>(|_me, _a| async move {
                info!(">> service B warming up");
                tokio::task::yield_now().await;
                info!("<< service B up");
                Ok(())
            })
            .on_deactivate(|_me| info!("service B down"));
    }
}

struct ClientC;

impl Component for ClientC {
    fn contract(builder: &mut ContractBuilder<Self>) {
        builder
            .on_activate::<(Rc<ServiceA>, Rc<ServiceB>), _>(|_me, (_a, _b)| {
                info!("client C wired");
                Ok(())
            })
            .on_deactivate(|_me| info!("client C unwired"));
    }
}

async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_logging()?;

    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let context = Context::new();

            let client = Rc::new(ClientC);
            let service_b = Rc::new(ServiceB);
            let service_a = Rc::new(ServiceA);

            // Reverse dependency order: nothing resolves until A arrives.
            context.register(client.clone())?;
            context.register(service_b.clone())?;
            info!(resolved = context.is_resolved::<ClientC>(), "before A");

            context.register(service_a.clone())?;
            settle().await;
            info!(resolved = context.is_resolved::<ClientC>(), "after A");

            // Removing B cascades: C deactivates without being unregistered.
            context.unregister(&service_b)?;
            info!(resolved = context.is_resolved::<ClientC>(), "after removing B");

            context.unregister(&client)?;
            context.unregister(&service_a)?;
            Ok::<_, anyhow::Error>(())
        })
        .await?;

    Ok(())
}
