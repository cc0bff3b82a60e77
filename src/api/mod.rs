//! Response envelopes and pagination shared by the REST handlers and the typed client

pub mod pagination;
pub mod response;

pub use pagination::{Paginated, PaginationMeta, PaginationParams};
pub use response::{Created, MessageBody, Success};
