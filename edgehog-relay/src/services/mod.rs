//! Transport to the GraphQL backend.

mod auth;
mod multipart;
mod transport;

pub use self::auth::NoToken;
pub use self::auth::StaticToken;
pub use self::auth::TokenProvider;
pub use self::transport::HttpTransport;

/// A type-erased transport, as driven by the [`Environment`](crate::Environment).
pub type BoxTransport = tower::util::BoxCloneService<
    crate::graphql::Request,
    crate::graphql::Response,
    crate::error::FetchError,
>;
