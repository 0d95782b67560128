//! Frame fan-out to subscribers
//!
//! The registry routes each frame produced by the capture session to every
//! attached subscriber without ever waiting on one of them.
//!
//! # Architecture
//!
//! ```text
//!                           Arc<Registry>
//!                     ┌─────────────────────────┐
//!                     │ RwLock<                 │
//!                     │   queues: HashMap<id,   │
//!                     │     FrameQueue (cap 2)>,│
//!                     │   session: Session,     │
//!                     │ >                       │
//!                     │ pool: BufferPool        │
//!                     └───────────┬─────────────┘
//!                                 │
//!         ┌───────────────────────┼───────────────────────┐
//!         │                       │                       │
//!         ▼                       ▼                       ▼
//!   [read loop]             [Subscription]          [Subscription]
//!   scanner.next_frame()    pull().await            pull().await
//!         │                       │                       │
//!         └──► registry.publish() ┘                       │
//!              push / drop oldest ────────────────────────┘
//! ```
//!
//! # Buffer lifecycle
//!
//! Published bytes live in a buffer checked out of the [`BufferPool`]. Each
//! receiving subscriber gets its own [`Frame`] handle; the buffer returns to
//! the pool only after every handle has been released, evicted or dropped.

pub mod frame;
pub mod pool;
pub(crate) mod queue;
pub(crate) mod store;
pub mod subscription;

pub use frame::Frame;
pub use pool::BufferPool;
pub(crate) use store::Registry;
pub use subscription::Subscription;
