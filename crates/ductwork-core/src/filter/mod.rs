//! Filter devices.
//!
//! A filter is a device defined in terms of another (underlying) device.
//! Filters here take the underlying stream by value; passing `&mut dev`
//! builds a filter that borrows — and therefore can never close — the
//! device it wraps. Closing a filter releases only the filter's own
//! state (emitting any trailing bytes its encoding requires).

pub mod limit;
pub mod pad;
pub mod repeat;

pub use limit::Limit;
pub use pad::BitPad;
pub use repeat::Repeat;
