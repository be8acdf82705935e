use std::path::Path;

use mime_guess::MimeGuess;

pub const FOLDER_MIME_TYPE: &str = "inode/directory";

pub struct MimeResolver;

impl MimeResolver {
    /// Guesses the MIME type from the file name only; content is never read.
    pub fn guess_mime_type(path: &Path) -> String {
        MimeGuess::from_path(path).first_or_octet_stream().to_string()
    }

    pub fn guess_for_name(name: &str) -> String {
        Self::guess_mime_type(Path::new(name))
    }

    /// Icon name following the freedesktop.org naming specification.
    /// e.g. "text/plain" -> "text-plain"
    pub fn get_icon_name(mime_type: &str) -> String {
        if mime_type == FOLDER_MIME_TYPE {
            return "folder".to_string();
        }
        mime_type.replace('/', "-")
    }

    /// Generic fallback, e.g. "image/png" -> "image-x-generic".
    pub fn get_generic_icon_name(mime_type: &str) -> String {
        match mime_type.split('/').next() {
            Some(media @ ("audio" | "image" | "text" | "video")) => format!("{}-x-generic", media),
            _ => "application-x-generic".to_string(),
        }
    }

    pub fn is_thumbnailable(mime_type: &str) -> bool {
        mime_type.starts_with("image/") || mime_type.starts_with("video/")
    }
}
