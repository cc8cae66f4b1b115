// Engine logical types and the host values they decode into.
//
// - logical: declared type descriptors, engine type names, type-name parsing
// - value: the host `Value` enum used for decoded cells and bound parameters
// - decimal / temporal / composite: host types with no direct std equivalent

mod composite;
mod decimal;
mod logical;
mod temporal;
mod value;

pub use composite::{MapValue, Sequence, StructValue};
pub use decimal::Decimal;
pub use logical::{DecimalWidth, LogicalType};
pub use temporal::{Interval, TimeTz};
pub use value::Value;
