pub mod filesystem;

pub use filesystem::FilesystemArtifactStore;
