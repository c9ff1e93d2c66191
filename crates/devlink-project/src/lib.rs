mod discovery;
mod fs_ops;
mod layout;
mod settings;

pub use discovery::{discover, PackageIndexCache};
pub use fs_ops::{content_digest, read_file, read_optional_file, write_file};
pub use layout::ProjectLayout;
pub use settings::{
    LinkSettings, SettingsOverrides, DEFAULT_PACKAGE_DIR, DEFAULT_RESOLVER, DEFAULT_VENDOR_DIR,
    EXTRA_NAMESPACES, SETTINGS_FILE,
};
