//! Event types published to the UI layer.
//!
//! All types derive `serde::Serialize` + `serde::Deserialize` so a host can
//! forward them over whatever bridge it uses (webview message port, JS
//! callbacks) without a second set of DTOs.

pub mod events;
