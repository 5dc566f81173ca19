//! # swot-collab — Real-time collaborative SWOT editing engine
//!
//! Lets multiple users edit one titled, categorized document together
//! and see each other's field-level presence live, with an explicit
//! save persisting a reconciled snapshot to external storage.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     WebSocket      ┌──────────────┐
//! │ CollabClient │ ◄────────────────► │ CollabServer │
//! │  (per user)  │    JSON frames     │   (relay)    │
//! └──────┬───────┘                    └──────┬───────┘
//!        │                                   │
//!        ▼                                   ▼
//! ┌──────────────┐                    ┌──────────────┐
//! │ EditorSession│                    │ RoomManager  │
//! │ doc + locks  │                    │ (fan-out)    │
//! └──────┬───────┘                    └──────────────┘
//!        │  explicit save
//!        ▼
//! ┌─────────────────────┐
//! │ PersistenceGateway  │ ──► storage HTTP API
//! └─────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] — JSON wire protocol (tagged ChangeEvent frames)
//! - [`document`] — SWOT document model and persistence flattening
//! - [`session`] — per-client sync engine and presence tracker
//! - [`broadcast`] — room-scoped fan-out (the collaboration hub)
//! - [`server`] — WebSocket relay server
//! - [`client`] — WebSocket transport channel
//! - [`persist`] — save gateway to the storage API
//!
//! ## Consistency model
//!
//! Last-writer-wins per field, fire-and-forget delivery, per-sender
//! FIFO ordering only. A dropped message means eventual divergence, not
//! an error; durable state is only what an explicit save persisted.

pub mod protocol;
pub mod document;
pub mod session;
pub mod broadcast;
pub mod server;
pub mod client;
pub mod persist;

// Re-exports for convenience
pub use protocol::{user_color, ChangeEvent, EditStatus, ProtocolError};
pub use document::{Category, FlatItem, Item, SwotDocument};
pub use session::{Applied, Editor, EditorSession, FieldKey};
pub use broadcast::{ChannelId, Room, RoomManager, RoomReceiver, RoomStats};
pub use server::{CollabServer, ServerConfig, ServerStats};
pub use client::{CollabClient, ConnectionState};
pub use persist::{GatewayConfig, PersistenceGateway, SaveError, SavedDocument, SavedItem};
