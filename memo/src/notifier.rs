use crate::error::NotifierError;
use crate::listener::{RemovalListener, RemovalNotification};

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::warn;

/// Delivers removal notifications to the user's listener, if there is one.
///
/// Delivery is synchronous. A listener that fails or panics is isolated here:
/// the failure is logged and the notification is dropped, never retried.
pub(crate) struct Notifier<K, V> {
  listener: Option<Arc<dyn RemovalListener<K, V>>>,
}

impl<K, V> Notifier<K, V> {
  pub(crate) fn new(listener: Option<Arc<dyn RemovalListener<K, V>>>) -> Self {
    Self { listener }
  }

  pub(crate) fn is_enabled(&self) -> bool {
    self.listener.is_some()
  }

  pub(crate) fn notify(&self, notification: RemovalNotification<K, V>) {
    let Some(listener) = &self.listener else {
      return;
    };

    let cause = notification.cause();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| listener.on_removal(notification)));
    let error = match outcome {
      Ok(Ok(())) => return,
      Ok(Err(error)) => NotifierError::Failed(error),
      Err(payload) => NotifierError::Panicked(panic_message(payload.as_ref())),
    };
    warn!(%cause, %error, "removal listener error ignored");
  }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
  if let Some(message) = payload.downcast_ref::<&str>() {
    (*message).to_string()
  } else if let Some(message) = payload.downcast_ref::<String>() {
    message.clone()
  } else {
    "non-string panic payload".to_string()
  }
}
