pub mod format;
pub mod path_codec;
pub mod codec;
pub mod crypto;
pub mod error;
pub mod packer;
pub mod reader;

pub use format::{Entry, EntryTable, Header, HEADER_SIZE, MAX_ENTRIES, MAX_FILE_SIZE, MAX_PATH_LEN};
pub use error::{FlkError, FlkResult};
pub use packer::{pack, PackMode, PackOptions, PackSummary, Packer};
pub use reader::{EntryInfo, FlkReader, UnpackOptions};
