mod common;
mod crawl;
mod init;
mod normalize;

pub use crawl::{CrawlArgs, process_crawl};
pub use init::{InitArgs, init_config};
pub use normalize::{NormalizeArgs, process_normalize};
