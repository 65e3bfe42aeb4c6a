//! mixlink-session: the session layer between an application and a
//! mix-network transport.
//!
//! A [`Session`] owns one bounded ingress queue and one table of reliable
//! sends awaiting acknowledgment. The transport calls back into the session
//! through [`InboundDispatcher`], which never blocks and never does I/O.

pub mod block_store;
pub mod dispatch;
pub mod error;
pub mod ingress;
pub mod loopback;
pub mod pending;
pub mod resolver;
pub mod session;
pub mod transport;

pub use block_store::{BlockStore, DiskBlockStore, StorageStub};
pub use dispatch::InboundDispatcher;
pub use error::{ResolveError, SessionError, StorageError, TransportError};
pub use ingress::{InboundMessage, IngressQueue};
pub use loopback::LoopbackNetwork;
pub use pending::{Delivery, DeliveryReceipt, DeliveryStatus};
pub use resolver::{DirectoryResolver, IdentityResolver, KeyDirectory, StaticDirectory};
pub use session::{Collaborators, Session, SessionState, SessionStats};
pub use transport::{MessageConsumer, SessionParams, Transport, TransportSession};

pub use mixlink_core::config::SessionConfig;
pub use mixlink_core::{EncodingError, Keypair, MessageId, PublicKey};
