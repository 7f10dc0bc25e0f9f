mod descriptor;
mod record;

pub use descriptor::{EntityDescriptor, KeyType};
pub use record::Record;
