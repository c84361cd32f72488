//! Client-side auto-save for the resume editor.
//!
//! The editor mirrors every form change into a [`Debouncer`]. A write to the
//! API fires only once input has been idle for the configured delay; newer
//! state supersedes anything still pending. Every change is also written to a
//! [`DraftCache`] so the last-known form state survives a failed save or a
//! closed tab.
//!
//! ```ignore
//! let client = ApiClient::new("https://resume.example.com", session_jwt)?;
//! let cache = DraftCache::new(data_dir.join("resume-draft.json"));
//! let autosave = Debouncer::spawn(client.clone(), AutosaveConfig::default(), Some(cache));
//!
//! autosave.push(form_state.clone())?;   // on every keystroke
//! client.set_token(refreshed_jwt).await; // when the session token rotates
//! autosave.flush().await?;              // before navigating away
//! ```

mod debounce;
mod draft;
mod error;
mod sink;

pub use debounce::{AutosaveConfig, Debouncer, SaveStatus, DEFAULT_DELAY};
pub use draft::{Draft, DraftCache};
pub use error::{AutosaveError, CacheError, SinkError};
pub use sink::{ApiClient, SaveSink};
