//! Wires two subscribers on the global router and publishes a few events.

use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Instant;

use anyhow::Result;
use async_trait::async_trait;
use dotenv::dotenv;
use log::debug;
use log::info;
use log::warn;
use weakbus::Router;
use weakbus::Subscriber;
use weakbus::config::Config;
use weakbus::logging::setup_logging;

#[derive(Debug)]
struct CartUpdated {
    items: usize,
}

struct CartBadge {
    name: &'static str,
    renders: AtomicUsize,
}

impl CartBadge {
    fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            renders: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Subscriber<CartUpdated> for CartBadge {
    async fn callback(&self, event: Arc<CartUpdated>) -> Result<()> {
        info!("{} shows {} item(s)", self.name, event.items);
        Ok(())
    }

    fn after_delivery(&self) {
        let renders = self.renders.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("{} re-rendered ({} total)", self.name, renders);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let init_start = Instant::now();
    let config = Config::from_env()?;
    setup_logging(&config)?;
    info!("Starting dispatch demo...");

    let router = Router::global();
    let header = CartBadge::new("header");
    let sidebar = CartBadge::new("sidebar");
    router.subscribe_subscriber::<CartUpdated, _>(&header);
    router.subscribe_subscriber::<CartUpdated, _>(&sidebar);

    router.publish(CartUpdated { items: 1 }).await?;
    info!(
        "{} subscriber(s) after first publish",
        router.subscriber_count::<CartUpdated>()
    );

    // Dropping the component is enough; no unsubscribe needed.
    drop(sidebar);
    router.publish(CartUpdated { items: 2 }).await?;
    info!(
        "{} subscriber(s) after sidebar was dropped",
        router.subscriber_count::<CartUpdated>()
    );

    router.unsubscribe_owner(&header);
    if router.contains::<CartUpdated>() {
        warn!("Channel still registered after teardown");
    }

    info!(
        "Demo finished in {:.2}s.",
        init_start.elapsed().as_secs_f64()
    );
    Ok(())
}
