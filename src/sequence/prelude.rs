pub use crate::sequence::traits::{Allocation, Bincode, Sequence, Snapshot};
pub use crate::{BincodeConfiguration, Word};

#[cfg(feature = "bounded")]
pub use crate::sequence::bounded::BoundedVec;
#[cfg(feature = "flip")]
pub use crate::sequence::flip::FlipVec;
#[cfg(feature = "hazard")]
pub use crate::sequence::hazard::HazardVec;
#[cfg(feature = "paged")]
pub use crate::sequence::paged::{HeapPages, Page, PageSource, PagedVec};

#[cfg(feature = "arena")]
pub use crate::sequence::arena::PageArena;

#[cfg(feature = "map")]
pub use crate::map::SequenceMap;
