//! Shared value types for PackShield.
//!
//! - **Identity** ([`PlayerId`], [`DeliveryId`]): who is protected and
//!   which pack deliveries they are waiting on.
//! - **Movement** ([`Location`], [`MoveEvent`]): what the engine reports
//!   when a player moves or looks around.
//! - **Presentation** ([`OverlayColor`], [`OverlayStyle`]): how the
//!   progress overlay is drawn.
//! - **Client feedback** ([`PackStatus`]): what a client says about a
//!   delivery.
//!
//! ```text
//! Engine events → types (this crate) → protection state machine
//! ```

mod movement;
mod types;

pub use movement::{Location, MoveEvent, Orientation, Position};
pub use types::{DeliveryId, OverlayColor, OverlayStyle, PackStatus, PlayerId};
