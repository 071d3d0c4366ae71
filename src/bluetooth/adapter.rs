//! Adapter power control.

use bluer::{Adapter, AdapterEvent, AdapterProperty, Session};
use futures::stream::StreamExt;
use log::{debug, info, warn};
use tokio::task::JoinHandle;

use crate::{
   error::Result,
   event::{EventSender, StackEvent},
};

/// Opens the named adapter, or the default one.
pub async fn open(session: &Session, name: Option<&str>) -> Result<Adapter> {
   let adapter = match name {
      Some(name) => session.adapter(name)?,
      None => session.default_adapter().await?,
   };
   info!("Using adapter {}", adapter.name());
   Ok(adapter)
}

/// Powers the adapter on and reports `PoweredOn` once it is up.
pub async fn power_on(adapter: &Adapter, events: &EventSender) -> Result<()> {
   if adapter.is_powered().await? {
      debug!("Adapter {} already powered", adapter.name());
   } else {
      adapter.set_powered(true).await?;
      info!("Powered on adapter: {}", adapter.name());
   }
   events.emit(StackEvent::PoweredOn);
   Ok(())
}

/// Reports later power changes, e.g. rfkill or a controller reset.
pub fn start_monitor(adapter: Adapter, events: EventSender) -> JoinHandle<()> {
   tokio::spawn(async move {
      let name = adapter.name().to_string();
      let Ok(mut stream) = adapter.events().await else {
         warn!("Failed to get adapter events for {name}");
         return;
      };

      while let Some(event) = stream.next().await {
         if let AdapterEvent::PropertyChanged(AdapterProperty::Powered(powered)) = event {
            debug!("Adapter {name} powered: {powered}");
            events.emit(if powered {
               StackEvent::PoweredOn
            } else {
               StackEvent::PoweredOff
            });
         }
      }
      warn!("Adapter {name} event stream ended");
   })
}
