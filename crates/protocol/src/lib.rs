pub mod node;
pub mod path;
pub mod record;

pub use node::ProfNode;
pub use record::RawRecord;
