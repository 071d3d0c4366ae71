//! Pairing agent.
//!
//! Legacy PIN requests are forwarded to the dispatcher, which decides what
//! PIN to answer with. Secure Simple Pairing confirmations are accepted.

use bluer::{
   Session,
   agent::{Agent, AgentHandle, ReqError, ReqResult, RequestConfirmation, RequestPinCode},
};
use log::info;
use tokio::sync::oneshot;

use crate::{
   error::Result,
   event::{EventSender, StackEvent},
};

pub async fn register(session: &Session, events: EventSender) -> Result<AgentHandle> {
   let agent = Agent {
      request_default: true,
      request_pin_code: Some(Box::new(move |req| Box::pin(request_pin(req, events.clone())))),
      request_confirmation: Some(Box::new(|req| Box::pin(confirm(req)))),
      ..Default::default()
   };
   Ok(session.register_agent(agent).await?)
}

async fn request_pin(req: RequestPinCode, events: EventSender) -> ReqResult<String> {
   let (tx, rx) = oneshot::channel();
   events.emit(StackEvent::PinCodeRequest {
      device: req.device,
      reply: tx,
   });
   rx.await.map(String::from).map_err(|_| ReqError::Rejected)
}

async fn confirm(req: RequestConfirmation) -> ReqResult<()> {
   info!("Confirming passkey {:06} for {}", req.passkey, req.device);
   Ok(())
}
