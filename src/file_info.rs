use std::collections::HashMap;

pub const ATTR_NAME: &str = "standard::name";
pub const ATTR_DISPLAY_NAME: &str = "standard::display-name";
pub const ATTR_TYPE: &str = "standard::type";
pub const ATTR_SIZE: &str = "standard::size";
pub const ATTR_CONTENT_TYPE: &str = "standard::content-type";
pub const ATTR_ICON: &str = "standard::icon";
pub const ATTR_IS_HIDDEN: &str = "standard::is-hidden";
pub const ATTR_TITLE: &str = "metadata::title";
pub const ATTR_AUTHOR: &str = "metadata::author";
pub const ATTR_MODIFIED: &str = "time::modified";

/// Attribute set requested by the model for every listed child.
pub const MODEL_ATTRIBUTES: &str = "standard::*,time::modified,metadata::*";

#[derive(Debug, Clone, PartialEq)]
pub enum FileAttributeType {
    String(String),
    Boolean(bool),
    Uint32(u32),
    Uint64(u64),
    Int64(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Unknown,
    Regular,
    Directory,
    SymbolicLink,
    Special,
    Mountable,
}

impl FileType {
    fn to_raw(self) -> u32 {
        match self {
            FileType::Unknown => 0,
            FileType::Regular => 1,
            FileType::Directory => 2,
            FileType::SymbolicLink => 3,
            FileType::Special => 4,
            FileType::Mountable => 6,
        }
    }

    fn from_raw(val: u32) -> Self {
        match val {
            1 => FileType::Regular,
            2 => FileType::Directory,
            3 => FileType::SymbolicLink,
            4 => FileType::Special,
            6 => FileType::Mountable,
            _ => FileType::Unknown,
        }
    }
}

/// Metadata bag cached per node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileInfo {
    attributes: HashMap<String, FileAttributeType>,
}

impl FileInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience constructor used by backends for a plain entry.
    pub fn for_entry(name: &str, file_type: FileType) -> Self {
        let mut info = Self::new();
        info.set_name(name);
        info.set_display_name(name);
        info.set_file_type(file_type);
        info.set_is_hidden(name.starts_with('.'));
        info
    }

    pub fn set_attribute(&mut self, key: &str, value: FileAttributeType) {
        self.attributes.insert(key.to_string(), value);
    }

    pub fn get_attribute(&self, key: &str) -> Option<&FileAttributeType> {
        self.attributes.get(key)
    }

    pub fn has_attribute(&self, key: &str) -> bool {
        self.attributes.contains_key(key)
    }

    pub fn remove_attribute(&mut self, key: &str) {
        self.attributes.remove(key);
    }

    fn get_string(&self, key: &str) -> Option<&str> {
        match self.get_attribute(key) {
            Some(FileAttributeType::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn set_name(&mut self, name: &str) {
        self.set_attribute(ATTR_NAME, FileAttributeType::String(name.to_string()));
    }

    pub fn get_name(&self) -> Option<&str> {
        self.get_string(ATTR_NAME)
    }

    pub fn set_display_name(&mut self, name: &str) {
        self.set_attribute(ATTR_DISPLAY_NAME, FileAttributeType::String(name.to_string()));
    }

    pub fn get_display_name(&self) -> Option<&str> {
        self.get_string(ATTR_DISPLAY_NAME)
    }

    pub fn set_file_type(&mut self, file_type: FileType) {
        self.set_attribute(ATTR_TYPE, FileAttributeType::Uint32(file_type.to_raw()));
    }

    pub fn get_file_type(&self) -> FileType {
        match self.get_attribute(ATTR_TYPE) {
            Some(FileAttributeType::Uint32(val)) => FileType::from_raw(*val),
            _ => FileType::Unknown,
        }
    }

    pub fn is_folder(&self) -> bool {
        matches!(self.get_file_type(), FileType::Directory | FileType::Mountable)
    }

    pub fn set_size(&mut self, size: u64) {
        self.set_attribute(ATTR_SIZE, FileAttributeType::Uint64(size));
    }

    pub fn get_size(&self) -> u64 {
        match self.get_attribute(ATTR_SIZE) {
            Some(FileAttributeType::Uint64(s)) => *s,
            Some(FileAttributeType::Int64(s)) => (*s).max(0) as u64,
            _ => 0,
        }
    }

    pub fn set_content_type(&mut self, content_type: &str) {
        self.set_attribute(ATTR_CONTENT_TYPE, FileAttributeType::String(content_type.to_string()));
    }

    pub fn get_content_type(&self) -> Option<&str> {
        self.get_string(ATTR_CONTENT_TYPE)
    }

    pub fn set_icon(&mut self, icon: &str) {
        self.set_attribute(ATTR_ICON, FileAttributeType::String(icon.to_string()));
    }

    pub fn get_icon(&self) -> Option<&str> {
        self.get_string(ATTR_ICON)
    }

    pub fn set_is_hidden(&mut self, hidden: bool) {
        self.set_attribute(ATTR_IS_HIDDEN, FileAttributeType::Boolean(hidden));
    }

    pub fn is_hidden(&self) -> bool {
        matches!(self.get_attribute(ATTR_IS_HIDDEN), Some(FileAttributeType::Boolean(true)))
    }

    /// Seconds since the Unix epoch.
    pub fn set_modification_time(&mut self, time: u64) {
        self.set_attribute(ATTR_MODIFIED, FileAttributeType::Uint64(time));
    }

    pub fn get_modification_time(&self) -> Option<u64> {
        match self.get_attribute(ATTR_MODIFIED) {
            Some(FileAttributeType::Uint64(t)) => Some(*t),
            _ => None,
        }
    }

    pub fn set_title(&mut self, title: &str) {
        self.set_attribute(ATTR_TITLE, FileAttributeType::String(title.to_string()));
    }

    pub fn get_title(&self) -> Option<&str> {
        self.get_string(ATTR_TITLE)
    }

    pub fn set_author(&mut self, author: &str) {
        self.set_attribute(ATTR_AUTHOR, FileAttributeType::String(author.to_string()));
    }

    pub fn get_author(&self) -> Option<&str> {
        self.get_string(ATTR_AUTHOR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_constructor_marks_dot_files_hidden() {
        let info = FileInfo::for_entry(".profile", FileType::Regular);
        assert!(info.is_hidden());
        assert!(!info.is_folder());
        assert_eq!(info.get_display_name(), Some(".profile"));

        let dir = FileInfo::for_entry("Music", FileType::Directory);
        assert!(!dir.is_hidden());
        assert!(dir.is_folder());
    }
}
