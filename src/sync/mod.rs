//! Collaborative session sync engine.
//!
//! [`store::SessionStore`] holds one client's copy of a session,
//! [`feed::ChangeFeedClient`] delivers row changes, [`reconciler::Table`]
//! merges them and [`visibility`] decides what a viewer may see.
//! [`room::SessionRoom`] wires the four together for one viewer.

pub mod backend;
pub mod error;
pub mod event;
pub mod feed;
pub mod reconciler;
pub mod room;
pub mod store;
pub mod visibility;

pub use backend::SessionBackend;
pub use error::SyncError;
pub use event::{Change, ChangeEvent, ChangeKind, EntityKind, RawChange};
pub use feed::{ChangeFeedClient, FeedSignal, FeedStatus, FeedTransport, RetryPolicy, Subscription};
pub use room::{LocalAction, MutationAck, MutationQueue, SessionRoom, SignalOutcome, StagedMutation};
pub use store::SessionStore;
pub use visibility::{Projection, RevealPolicy, project, project_with};
