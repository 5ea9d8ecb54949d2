//! # Session Phase Coordinator
//!
//! Moves clients that arrive through a protocol-translation bridge from the
//! configuration phase into play, and keeps them there. Bridged clients stall
//! on configuration tasks they cannot process, trip host validation that was
//! written for native clients, and spawn into states their bridge has not
//! caught up with. The coordinator sits on the host's connection hooks and
//! corrects each of these without touching native clients.
//!
//! ## Components
//!
//! ### Bridge Client Detector (`detector`)
//! Classifies a session once, from the bridge registry when it is installed
//! and from the reserved display-name prefix otherwise.
//!
//! ### Phase Transition Coordinator (`coordinator`)
//! Strips bridge-incompatible configuration tasks and runs the completion
//! strategies in order: finish configuration, direct advance, synthetic
//! client finish. A completion record per session keeps repeated triggers
//! from advancing a session twice.
//!
//! ### Timeout Watchdog (`watchdog`)
//! One single-shot timer per configuring bridged session. On expiry the
//! coordinator drains the task queue and forces completion.
//!
//! ### Spawn Synchronizer (`spawn_sync`)
//! Re-sends abilities, position, game mode, held item, inventory, time and
//! weather on entering play, then a reduced subset after short delays.
//!
//! ### Safe Placement Resolver (`placement`)
//! Finds standable ground in a column and judges whether a player's current
//! position is survivable.
//!
//! ### Disconnect Classifier (`classifier`)
//! Separates protocol-validation noise from genuine disconnects.
//!
//! ### Recursion Guard (`recursion_guard`)
//! Bounds recursive diagnostic descriptions per thread.
//!
//! ## Threading
//!
//! Hooks run on the host's tick thread and receive the host by mutable
//! reference. Timers run as tokio tasks and only ever post a `TickJob` to the
//! tick queue; the tick loop hands each job back to the coordinator.
//!
//! ## Demo host
//!
//! `game`, `world`, `client_manager` and `network` form a small UDP host that
//! implements the host traits over an in-memory flat level. The `server`
//! binary runs it and `test_client` connects to it.
//!
//! ```rust,no_run
//! use server::config::CoordinatorConfig;
//! use server::network::Server;
//! use server::world::FlatLevel;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new(
//!         "127.0.0.1:8080",
//!         Duration::from_millis(50), // 20 Hz
//!         32,
//!         CoordinatorConfig::default(),
//!         FlatLevel::new(63),
//!     )
//!     .await?;
//!
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod classifier;
pub mod client_manager;
pub mod config;
pub mod coordinator;
pub mod detector;
pub mod error;
pub mod game;
pub mod host;
pub mod network;
pub mod placement;
pub mod recursion_guard;
pub mod session;
pub mod spawn_sync;
pub mod tick;
pub mod watchdog;
pub mod world;
