//! Dynamic WHERE clause builder for list endpoints
//!
//! Column names always come from code; only values are bound as parameters.

use crate::models::{like_pattern, Page};
use postgres_types::ToSql;
use uuid::Uuid;

type Param = Box<dyn ToSql + Sync + Send>;

pub struct SqlFilter {
    clauses: Vec<String>,
    params: Vec<Param>,
}

impl SqlFilter {
    /// Every filter starts scoped to one tenant
    pub fn for_tenant(tenant_id: Uuid) -> Self {
        let mut filter = Self {
            clauses: Vec::new(),
            params: Vec::new(),
        };
        filter.eq("tenant_id", tenant_id);
        filter
    }

    fn bind<T: ToSql + Sync + Send + 'static>(&mut self, value: T) -> usize {
        self.params.push(Box::new(value));
        self.params.len()
    }

    /// `column = $n`
    pub fn eq<T: ToSql + Sync + Send + 'static>(&mut self, column: &str, value: T) -> &mut Self {
        let n = self.bind(value);
        self.clauses.push(format!("{} = ${}", column, n));
        self
    }

    pub fn eq_opt<T: ToSql + Sync + Send + 'static>(
        &mut self,
        column: &str,
        value: Option<T>,
    ) -> &mut Self {
        if let Some(value) = value {
            self.eq(column, value);
        }
        self
    }

    /// Case-insensitive substring match across several columns
    pub fn search(&mut self, columns: &[&str], term: Option<&str>) -> &mut Self {
        let term = match term.map(str::trim) {
            Some(t) if !t.is_empty() => t,
            _ => return self,
        };
        let n = self.bind(like_pattern(term));
        let ors: Vec<String> = columns
            .iter()
            .map(|c| format!("{} ILIKE ${}", c, n))
            .collect();
        self.clauses.push(format!("({})", ors.join(" OR ")));
        self
    }

    /// ` WHERE a AND b ...`
    pub fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }

    pub fn params(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.params
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect()
    }

    /// Bind limit/offset and return ` LIMIT $n OFFSET $m`
    pub fn page_clause(&mut self, page: Page) -> String {
        let limit = self.bind(page.limit());
        let offset = self.bind(page.offset());
        format!(" LIMIT ${} OFFSET ${}", limit, offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_tenant_scope_is_first() {
        let filter = SqlFilter::for_tenant(Uuid::new_v4());
        assert_eq!(filter.where_sql(), " WHERE tenant_id = $1");
        assert_eq!(filter.params().len(), 1);
    }

    #[test]
    fn test_placeholders_are_sequential() {
        let mut filter = SqlFilter::for_tenant(Uuid::new_v4());
        filter
            .eq_opt("status", Some("draft".to_string()))
            .eq_opt::<String>("priority", None)
            .search(&["title", "description"], Some("renewal"));

        assert_eq!(
            filter.where_sql(),
            " WHERE tenant_id = $1 AND status = $2 AND (title ILIKE $3 OR description ILIKE $3)"
        );

        let page = filter.page_clause(Page::new(Some(2), Some(10)));
        assert_eq!(page, " LIMIT $4 OFFSET $5");
        assert_eq!(filter.params().len(), 5);
    }

    #[test]
    fn test_blank_search_is_ignored() {
        let mut filter = SqlFilter::for_tenant(Uuid::new_v4());
        filter.search(&["name"], Some("   "));
        assert_eq!(filter.where_sql(), " WHERE tenant_id = $1");
    }
}
