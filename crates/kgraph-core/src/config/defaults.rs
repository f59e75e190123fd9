//! Default values for kgraph configuration.
//!
//! All hardcoded defaults are centralized here for easy maintenance.

// ============================================================================
// Analysis Defaults
// ============================================================================

/// Source file extensions analyzed by default.
pub const DEFAULT_EXTENSIONS: &[&str] = &["cs"];

/// Directories never scanned for sources or project files.
pub const DEFAULT_EXCLUDE_DIRS: &[&str] = &[
    "bin",
    "obj",
    ".git",
    ".vs",
    ".idea",
    "node_modules",
    "packages",
    "TestResults",
];

/// Maximum size of a single source file (1 MB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024;

/// Assembly name prefixes that belong to the host platform's standard library.
pub const DEFAULT_PLATFORM_ASSEMBLY_PREFIXES: &[&str] = &[
    "System",
    "Microsoft",
    "mscorlib",
    "netstandard",
    "WindowsBase",
    "PresentationCore",
    "PresentationFramework",
];

/// The platform's root object type; inheriting from it is not recorded.
pub const DEFAULT_ROOT_OBJECT_TYPE: &str = "System.Object";

/// Assembly the reference oracle assigns to predefined types.
pub const DEFAULT_PLATFORM_ASSEMBLY: &str = "System.Private.CoreLib";

// ============================================================================
// Storage Defaults
// ============================================================================

/// Storage backend used when none is configured.
pub const DEFAULT_STORAGE_BACKEND: &str = "file";

/// Storage backends understood by [`crate::gateway::open_gateway`].
pub const STORAGE_BACKENDS: &[&str] = &["file", "surreal", "memory"];

/// Base directory for persisted graphs.
pub const DEFAULT_DATA_DIR: &str = ".kgraph";

/// Maximum size of a single stored document (2 MB).
pub const DEFAULT_MAX_DOCUMENT_BYTES: usize = 2 * 1024 * 1024;

/// Share of the document limit a fragment is filled to.
pub const DEFAULT_FRAGMENT_FILL_RATIO: f64 = 0.9;

// ============================================================================
// Batch Defaults
// ============================================================================

/// Projects analyzed concurrently.
pub const DEFAULT_MAX_CONCURRENT_PROJECTS: usize = 4;

/// Attempts to persist a project when a concurrent writer conflicts.
pub const DEFAULT_PERSIST_RETRIES: u32 = 3;

/// Attempts of a whole batch after an infrastructure failure.
pub const DEFAULT_BATCH_ATTEMPTS: u32 = 2;

// ============================================================================
// Logging Defaults
// ============================================================================

/// Default tracing filter.
pub const DEFAULT_LOG_LEVEL: &str = "info";

// ============================================================================
// File Names
// ============================================================================

/// Project-local configuration file.
pub const LOCAL_CONFIG_FILE: &str = "kgraph.toml";

/// Directory under the user config dir holding `config.toml`.
pub const USER_CONFIG_DIR: &str = "kgraph";
