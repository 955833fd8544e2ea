//! # rootio
//!
//! Native reader for ROOT files and their TTree columnar data.
//!
//! Parses the TFile/TDirectory/TKey container, decodes the streamed object
//! graph (TStreamerInfo, TTree, TBranch, TLeaf and the TList/TObjArray
//! collections), and materializes branches into flat, fixed-size or jagged
//! arrays. Supports zlib, LZMA, LZ4 and ZSTD compressed records, local files,
//! HTTP range requests and pluggable remote protocols.
//!
//! ## Example
//!
//! ```no_run
//! use rootio::{ReadOptions, RootFile};
//!
//! let f = RootFile::open("events.root").unwrap();
//! for key in f.list_keys() {
//!     println!("{} ({})", key.path, key.class_name);
//! }
//!
//! let tree = f.get_tree("events").unwrap();
//! let reader = f.branch_reader(&tree, "pt").unwrap();
//! let pt = reader.array(0..tree.numentries(), &ReadOptions::default()).unwrap();
//! println!("{} entries as {}", pt.len(), reader.interpretation());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod array;
pub mod basket;
pub mod branch_reader;
pub mod cache;
pub mod compression;
pub mod cursor;
pub mod directory;
pub mod error;
pub mod file;
pub mod interpretation;
pub mod key;
pub mod lazy;
pub mod objects;
pub mod registry;
pub mod source;
pub mod streamer;
pub mod tree;
pub mod version;

pub use array::{Array, JaggedArray, Value};
pub use branch_reader::{BranchReader, BranchRequest, LazyArray, ReadOptions};
pub use cache::{Cache, CacheConfig, CacheStats, Caches, LruCache};
pub use compression::{Algorithm, Compression};
pub use directory::Directory;
pub use error::{Result, RootError};
pub use file::{FileHeader, OpenOptions, RootFile};
pub use interpretation::{Dtype, Interpretation, NumericArray};
pub use key::{Key, KeyInfo};
pub use lazy::Lazy;
pub use objects::Object;
pub use registry::ClassRegistry;
pub use source::{ByteSource, MemorySource, SourceOptions};
pub use tree::{Branch, Leaf, Tree};
