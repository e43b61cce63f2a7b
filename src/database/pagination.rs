use serde::Serialize;

/// Requested page, already validated: `page >= 1`, `1 <= page_size <= MAX_PAGE_SIZE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub page_size: i64,
}

impl PageRequest {
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.page_size)
    }
}

/// Payload of the `X-Pagination` response header.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PageMetadata {
    pub total: i64,
    pub total_pages: i64,
    pub first_page: i64,
    pub last_page: i64,
    pub page: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_page: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page: Option<i64>,
}

#[derive(Serialize, Debug)]
pub struct PageContext<T> {
    pub rows: Vec<T>,
    pub metadata: PageMetadata,
}

impl<T> PageContext<T> {
    pub fn from_rows(rows: Vec<T>, total_rows: i64, request: PageRequest) -> Self {
        if total_rows <= 0 {
            return Self::no_rows(rows, request);
        }

        let total_pages = (total_rows + request.page_size - 1) / request.page_size;
        let page = request.page;

        Self {
            rows,
            metadata: PageMetadata {
                total: total_rows,
                total_pages,
                first_page: 1,
                last_page: total_pages,
                page,
                previous_page: (page > 1).then(|| (page - 1).min(total_pages)),
                next_page: (page < total_pages).then_some(page + 1),
            },
        }
    }

    pub fn no_rows(rows: Vec<T>, request: PageRequest) -> Self {
        Self {
            rows,
            metadata: PageMetadata {
                total: 0,
                total_pages: 0,
                first_page: 1,
                last_page: 1,
                page: request.page,
                previous_page: None,
                next_page: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn request(page: i64, page_size: i64) -> PageRequest {
        PageRequest { page, page_size }
    }

    #[test]
    fn offset_starts_at_zero() {
        assert_eq!(request(1, 10).offset(), 0);
        assert_eq!(request(3, 25).offset(), 50);
    }

    #[test]
    fn middle_page_links_both_ways() {
        let context = PageContext::from_rows(vec![(); 10], 35, request(2, 10));

        assert_eq!(
            context.metadata,
            PageMetadata {
                total: 35,
                total_pages: 4,
                first_page: 1,
                last_page: 4,
                page: 2,
                previous_page: Some(1),
                next_page: Some(3),
            }
        );
    }

    #[test]
    fn last_page_has_no_next() {
        let context = PageContext::from_rows(vec![(); 5], 35, request(4, 10));

        assert_eq!(context.metadata.next_page, None);
        assert_eq!(context.metadata.previous_page, Some(3));
    }

    #[test]
    fn page_past_the_end_points_back_to_last() {
        let context = PageContext::<()>::from_rows(vec![], 35, request(9, 10));

        assert_eq!(context.metadata.previous_page, Some(4));
        assert_eq!(context.metadata.next_page, None);
    }

    #[test]
    fn empty_listing() {
        let context = PageContext::<()>::from_rows(vec![], 0, request(1, 10));
        let header = serde_json::to_value(&context.metadata).unwrap();

        assert_eq!(
            header,
            serde_json::json!({
                "total": 0,
                "totalPages": 0,
                "firstPage": 1,
                "lastPage": 1,
                "page": 1,
            })
        );
    }
}
