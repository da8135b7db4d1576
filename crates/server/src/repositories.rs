mod allowlist;

pub use allowlist::AllowlistRepository;
