//! 记忆层：会话记录、历史元数据、压缩、持久化

pub mod compressor;
pub mod conversation;
pub mod history;
pub mod persistence;
pub mod sqlite;
pub mod store;

pub use compressor::{is_summary, HistoryCompressor, SUMMARY_HEADER};
pub use conversation::{render_transcript, Content, FunctionCall, FunctionResponse, Part, Role};
pub use history::{transcript_key, History};
pub use persistence::{
    load_transcript, save_transcript, FileStorage, InMemoryStore, Repository, Storage,
};
pub use sqlite::SqliteRepository;
pub use store::HistoryStore;
