pub mod chunker;
pub mod context_assembler;
pub mod coordination;
pub mod debounce;
pub mod document_source;
pub mod indexer;
pub mod parser;
pub mod path_filter;
pub mod scanner;
pub mod watcher;

pub use chunker::{ChunkerConfig, DocumentChunker, TextChunk};
pub use context_assembler::{AssembledContext, ContextAssembler};
pub use coordination::{CoordinationError, WatcherCoordinator, WatcherLock};
pub use debounce::{BatchProcessor, DebounceConfig, DebouncedWatcher};
pub use document_source::DocumentSource;
pub use indexer::{IndexStats, Indexer, ScoreWeights, SearchOptions, SearchResults, Status, merge_chunks};
pub use parser::{is_excluded, is_indexable};
pub use path_filter::{PathFilter, default_ignore_patterns};
pub use scanner::{ScanError, ScanProgress, ScanResult, ScannedFile, Scanner};
pub use watcher::{ChangeKind, FileChange, FileWatcher, WatchError};
