//! Queries over a country's `attractions` table.
//!
//! All user-supplied values are bound as parameters. The only text spliced
//! into SQL is the ORDER BY clause, which comes from [`SortOrder`] and never
//! from the request.

mod rating;

use log::debug;
use std::fmt;

use rusqlite::{
    Connection, OptionalExtension, Row, params_from_iter,
    types::{Value, ValueRef},
};
use serde::Serialize;
use strum::{Display, EnumString, VariantNames};

use crate::{
    error::{ApiError, Result},
    images::Image,
};

pub use rating::{PERFECT_RATING, is_perfect_rating, rating_value, register_functions};

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Allowed list orderings, as accepted in the `order` query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, EnumString, VariantNames, Display)]
#[strum(serialize_all = "snake_case")]
pub enum SortOrder {
    RatingAsc,
    #[default]
    RatingDesc,
    ReviewsAsc,
    ReviewsDesc,
    PositiveAsc,
    PositiveDesc,
}

impl SortOrder {
    /// Parse an `order` token, falling back to `rating_desc` for anything unknown.
    #[must_use]
    pub fn parse_or_default(token: Option<&str>) -> Self {
        token.and_then(|raw| raw.parse().ok()).unwrap_or_default()
    }

    /// ORDER BY clause for this ordering. `rowid` keeps table order among equal keys.
    #[must_use]
    pub const fn order_by(self) -> &'static str {
        match self {
            SortOrder::RatingAsc => {
                "is_perfect_rating(rating) DESC, rating_value(rating) ASC, rowid ASC"
            }
            SortOrder::RatingDesc => {
                "is_perfect_rating(rating) DESC, rating_value(rating) DESC, rowid ASC"
            }
            SortOrder::ReviewsAsc => "total_reviews ASC, rowid ASC",
            SortOrder::ReviewsDesc => "total_reviews DESC, rowid ASC",
            SortOrder::PositiveAsc => "positive_reviews ASC, rowid ASC",
            SortOrder::PositiveDesc => "positive_reviews DESC, rowid ASC",
        }
    }
}

/// Filters and pagination for [`list_attractions`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub min_reviews: i64,
    pub order: SortOrder,
    /// 1-indexed.
    pub page: u32,
    pub limit: u32,
    pub region: Option<String>,
    pub county: Option<String>,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            min_reviews: 0,
            order: SortOrder::default(),
            page: DEFAULT_PAGE,
            limit: DEFAULT_PAGE_SIZE,
            region: None,
            county: None,
        }
    }
}

impl ListQuery {
    #[must_use]
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }
}

/// One page of results plus the number of rows matching the filters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub total: u64,
    pub data: Vec<T>,
}

/// Attraction id as stored. Datasets normally use INTEGER ids, but text ids
/// are passed through unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum AttractionId {
    Integer(i64),
    Text(String),
}

impl AttractionId {
    fn from_value(value: ValueRef<'_>) -> Option<Self> {
        match value {
            ValueRef::Null => None,
            ValueRef::Integer(number) => Some(AttractionId::Integer(number)),
            ValueRef::Real(number) => Some(AttractionId::Text(number.to_string())),
            ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
                Some(AttractionId::Text(String::from_utf8_lossy(bytes).into_owned()))
            }
        }
    }
}

impl fmt::Display for AttractionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttractionId::Integer(number) => write!(f, "{number}"),
            AttractionId::Text(text) => f.write_str(text),
        }
    }
}

impl From<i64> for AttractionId {
    fn from(id: i64) -> Self {
        AttractionId::Integer(id)
    }
}

/// Row returned by the attraction list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttractionSummary {
    pub id: Option<AttractionId>,
    pub name: Option<String>,
    pub image1: Image,
    pub region: Option<String>,
    pub county: Option<String>,
    pub total_reviews: Option<i64>,
    pub rating: Option<String>,
    pub positive_reviews: Option<i64>,
}

impl AttractionSummary {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: AttractionId::from_value(row.get_ref("id")?),
            name: text_column(row, "name")?,
            image1: Image::from_flag(row.get_ref("image1")?),
            region: text_column(row, "region")?,
            county: text_column(row, "county")?,
            total_reviews: integer_column(row, "total_reviews")?,
            rating: text_column(row, "rating")?,
            positive_reviews: integer_column(row, "positive_reviews")?,
        })
    }
}

/// Full attraction record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attraction {
    pub id: Option<AttractionId>,
    pub image1: Image,
    pub image2: Image,
    pub image3: Image,
    pub name: Option<String>,
    pub region: Option<String>,
    pub county: Option<String>,
    pub overview: Option<String>,
    pub duration: Option<String>,
    pub details: Option<String>,
    pub position: Option<String>,
    pub total_reviews: Option<i64>,
    pub rating: Option<String>,
    pub positive_reviews: Option<i64>,
    pub website: Option<String>,
}

impl Attraction {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: AttractionId::from_value(row.get_ref("id")?),
            image1: Image::from_flag(row.get_ref("image1")?),
            image2: Image::from_flag(row.get_ref("image2")?),
            image3: Image::from_flag(row.get_ref("image3")?),
            name: text_column(row, "name")?,
            region: text_column(row, "region")?,
            county: text_column(row, "county")?,
            overview: text_column(row, "overview")?,
            duration: text_column(row, "duration")?,
            details: text_column(row, "details")?,
            position: text_column(row, "position")?,
            total_reviews: integer_column(row, "total_reviews")?,
            rating: text_column(row, "rating")?,
            positive_reviews: integer_column(row, "positive_reviews")?,
            website: text_column(row, "website")?,
        })
    }
}

/// Optional columns, which differ between dataset variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Columns {
    pub has_county: bool,
}

impl Columns {
    /// Inspect the `attractions` table of an open dataset.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::QueryFailed`] if the schema cannot be read.
    pub fn detect(conn: &Connection) -> Result<Self> {
        let mut statement = conn.prepare("SELECT name FROM pragma_table_info('attractions')")?;
        let names = statement
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(Self {
            has_county: names.iter().any(|name| name.eq_ignore_ascii_case("county")),
        })
    }

    const fn county_select(self) -> &'static str {
        if self.has_county { "county" } else { "NULL AS county" }
    }

    fn require_county(self) -> Result<()> {
        if self.has_county {
            Ok(())
        } else {
            Err(ApiError::InvalidInput(
                "this dataset has no county column".to_string(),
            ))
        }
    }
}

/// Distinct region names, optionally limited to one county.
///
/// # Errors
///
/// Returns [`ApiError::InvalidInput`] when filtering by county on a dataset
/// without counties, and [`ApiError::QueryFailed`] on SQLite errors.
pub fn distinct_regions(conn: &Connection, county: Option<&str>) -> Result<Vec<String>> {
    let regions = if let Some(county) = county {
        Columns::detect(conn)?.require_county()?;
        let mut statement = conn.prepare(
            "SELECT DISTINCT region FROM attractions WHERE region IS NOT NULL AND county = ?1",
        )?;
        statement
            .query_map([county], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?
    } else {
        let mut statement =
            conn.prepare("SELECT DISTINCT region FROM attractions WHERE region IS NOT NULL")?;
        statement
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?
    };

    debug!("Found {} distinct regions", regions.len());
    Ok(regions)
}

/// Distinct county names. Empty for datasets without a county column.
///
/// # Errors
///
/// Returns [`ApiError::QueryFailed`] on SQLite errors.
pub fn distinct_counties(conn: &Connection) -> Result<Vec<String>> {
    if !Columns::detect(conn)?.has_county {
        debug!("Dataset has no county column");
        return Ok(Vec::new());
    }

    let mut statement =
        conn.prepare("SELECT DISTINCT county FROM attractions WHERE county IS NOT NULL")?;
    let counties = statement
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;

    debug!("Found {} distinct counties", counties.len());
    Ok(counties)
}

/// One page of attractions matching the review threshold and filters.
///
/// `total` counts every matching row regardless of `page` and `limit`.
/// Empty region or county strings do not filter.
///
/// # Errors
///
/// Returns [`ApiError::InvalidInput`] for a county filter on a dataset without
/// counties, and [`ApiError::QueryFailed`] on SQLite errors.
pub fn list_attractions(conn: &Connection, query: &ListQuery) -> Result<Page<AttractionSummary>> {
    let columns = Columns::detect(conn)?;

    let mut filters = String::from(" WHERE total_reviews >= ?");
    let mut params = vec![Value::Integer(query.min_reviews)];

    if let Some(region) = non_empty(query.region.as_deref()) {
        filters.push_str(" AND region = ?");
        params.push(Value::Text(region.to_string()));
    }
    if let Some(county) = non_empty(query.county.as_deref()) {
        columns.require_county()?;
        filters.push_str(" AND county = ?");
        params.push(Value::Text(county.to_string()));
    }

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM attractions{filters}"),
        params_from_iter(params.iter()),
        |row| row.get(0),
    )?;

    let sql = format!(
        "SELECT id, name, image1, region, {county}, total_reviews, rating, positive_reviews \
         FROM attractions{filters} ORDER BY {order} LIMIT ? OFFSET ?",
        county = columns.county_select(),
        order = query.order.order_by(),
    );
    params.push(Value::Integer(i64::from(query.limit)));
    params.push(Value::Integer(
        i64::try_from(query.offset()).unwrap_or(i64::MAX),
    ));

    let mut statement = conn.prepare(&sql)?;
    let data = statement
        .query_map(params_from_iter(params.iter()), AttractionSummary::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    debug!(
        "Listed {} of {total} attractions (order {}, page {}, limit {})",
        data.len(),
        query.order,
        query.page,
        query.limit
    );

    Ok(Page {
        total: u64::try_from(total).unwrap_or_default(),
        data,
    })
}

/// Single attraction by id, or `None` when absent.
///
/// `id` is bound as text; SQLite converts it when the column has INTEGER
/// affinity, so `"7"` finds row 7 and text ids match as stored.
///
/// # Errors
///
/// Returns [`ApiError::QueryFailed`] on SQLite errors.
pub fn find_attraction(conn: &Connection, id: &str) -> Result<Option<Attraction>> {
    let columns = Columns::detect(conn)?;
    let sql = format!(
        "SELECT id, image1, image2, image3, name, region, {county}, overview, duration, \
         details, position, total_reviews, rating, positive_reviews, website \
         FROM attractions WHERE id = ?1",
        county = columns.county_select(),
    );

    Ok(conn
        .query_row(&sql, [id], Attraction::from_row)
        .optional()?)
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.is_empty())
}

/// Read a column as text whatever its storage class.
fn text_column(row: &Row<'_>, name: &str) -> rusqlite::Result<Option<String>> {
    Ok(match row.get_ref(name)? {
        ValueRef::Null => None,
        ValueRef::Integer(number) => Some(number.to_string()),
        ValueRef::Real(number) => Some(number.to_string()),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Some(String::from_utf8_lossy(bytes).into_owned())
        }
    })
}

/// Read a column as an integer, accepting numeric text.
#[allow(clippy::cast_possible_truncation)]
fn integer_column(row: &Row<'_>, name: &str) -> rusqlite::Result<Option<i64>> {
    Ok(match row.get_ref(name)? {
        ValueRef::Null | ValueRef::Blob(_) => None,
        ValueRef::Integer(number) => Some(number),
        ValueRef::Real(number) => Some(number as i64),
        ValueRef::Text(bytes) => std::str::from_utf8(bytes)
            .ok()
            .and_then(|text| text.trim().parse().ok()),
    })
}
