pub mod artifact;
pub mod canon;
pub mod compiler;
pub mod db;
pub mod diag;
pub mod dirty;
pub mod entry;
pub mod fs;
pub mod graph;
pub mod hash;
pub mod include;
pub mod progress;
pub mod run;
pub mod scanner;
pub mod settings;
pub mod task;
pub mod trace;
pub mod work;

mod densemap;

#[cfg(not(any(windows, target_arch = "wasm32")))]
use jemallocator::Jemalloc;

#[cfg(not(any(windows, target_arch = "wasm32")))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;
