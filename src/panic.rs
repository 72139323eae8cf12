use std::any::Any;

/// Extracts a readable message from a caught panic payload.
pub(crate) fn panic_message(err: &(dyn Any + Send)) -> String {
    if let Some(msg) = err.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = err.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
