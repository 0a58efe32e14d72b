//! Runtime-agnostic request and response values.

mod files;
mod headers;
mod request;
mod response;
mod server_vars;

pub use files::{FileNode, FileTree, UploadedFile, UPLOAD_ERR_NO_FILE, UPLOAD_ERR_OK};
pub use headers::{Header, HeaderList};
pub use request::{
    CanonicalRequest, Params, RequestBuilder, RequestError, Scheme,
    FORWARDED_PROTO,
};
pub use response::{
    CanonicalResponse, SameSite, SetCookie, INTERNAL_ERROR_BODY,
};
pub use server_vars::ServerVars;
