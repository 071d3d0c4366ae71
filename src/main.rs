//! Hands-Free Profile probe
//!
//! Powers on the local adapter, looks up the Hands-Free service of a remote
//! device over SDP, opens an RFCOMM channel to it and answers the service
//! level connection handshake as an Audio Gateway.

use std::env;

use bluer::Session;
use log::info;
use tokio::signal;

use bluetooth::{BluerStack, adapter, agent};
use event::{EventQueue, EventSender};
use probe::Probe;

mod bluetooth;
mod config;
mod error;
mod event;
mod hfp;
mod probe;
mod sdp;
mod services;

use crate::error::Result;

#[tokio::main]
async fn main() -> Result<()> {
   env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

   info!("Starting hfp-probe...");

   let mut config = config::Config::load()?;
   if let Some(address) = env::args().nth(1) {
      config = config.with_remote(&address)?;
   }
   info!(
      "Target {} service {:#06x}",
      config.remote_address, config.service_uuid
   );

   let queue = EventQueue::new();
   let events: EventSender = queue.clone();

   let session = Session::new().await?;
   let adapter = adapter::open(&session, config.adapter.as_deref()).await?;
   let _agent = agent::register(&session, events.clone()).await?;
   let _monitor = adapter::start_monitor(adapter.clone(), events.clone());

   let probe = Probe::new(&config, BluerStack::new(&config, events.clone()))?;
   adapter::power_on(&adapter, &events).await?;

   tokio::select! {
      () = probe.run(&queue) => {},
      res = signal::ctrl_c() => {
         res?;
         info!("Interrupted");
      },
   }

   info!("Shutting down hfp-probe...");
   Ok(())
}
