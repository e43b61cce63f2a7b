pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 100;

pub const INGREDIENT_NAME_MAX_LENGTH: usize = 128;
pub const PRODUCT_ID_MAX: i64 = 9_999_999_999_999;

pub const ETAG_HEADER: &str = "etag";
pub const IF_MATCH_HEADER: &str = "if-match";
pub const IF_NONE_MATCH_HEADER: &str = "if-none-match";
pub const PAGINATION_HEADER: &str = "x-pagination";

pub const MAX_BODY_BYTES: u64 = 64 * 1024;

pub const STORAGE_RETRY_MESSAGE: &str =
    "The request could not be completed by the storage layer, please retry";

/// Upper bound on how long a request waits for the store's write lock.
pub const DATABASE_BUSY_TIMEOUT_SECONDS: u64 = 5;
