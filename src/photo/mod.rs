/// Photo handling: EXIF camera direction and upload/storage

pub mod exif;
pub mod upload;
