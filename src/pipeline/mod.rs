//! Pipeline stages for paper extraction and figure analysis.
//!
//! Each submodule implements exactly one step. Keeping stages separate makes
//! each independently testable and lets us swap implementations (e.g. a
//! different reference locator or vision provider) without touching the
//! others.
//!
//! ## Data Flow
//!
//! ```text
//! task ──▶ archive ──▶ order ──▶ locate ──▶ encode ──▶ vision
//! (submit,  (download,  (reading  (context   (data URI)  (VLM)
//!  poll)     unpack)     order)    window)
//! ```
//!
//! 1. [`task`]: submit the document URL and poll the remote parser
//! 2. [`archive`]: stream the bundle to a temp file, unpack it in
//!    `spawn_blocking`, and write `paper.md` + `images/` into the backup store
//! 3. [`order`]: list the images the Markdown references, in reading order
//! 4. [`locate`]: find each image's first textual reference and the lines
//!    around it
//! 5. [`encode`]: base64-wrap image bytes for the request body
//! 6. [`vision`]: the chat-completions call; the only analysis stage with
//!    network I/O

pub mod archive;
pub mod encode;
pub mod locate;
pub mod order;
pub mod task;
pub mod vision;
