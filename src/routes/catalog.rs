//! Attraction catalog routes. Each request opens its own dataset and always
//! closes it, whether the query succeeded or not.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;

use crate::{
    attractions::{
        Attraction, AttractionSummary, DEFAULT_PAGE, DEFAULT_PAGE_SIZE, ListQuery, MAX_PAGE_SIZE,
        Page, SortOrder, distinct_counties, distinct_regions, find_attraction, list_attractions,
    },
    dataset::Dataset,
    error::{ApiError, Result},
    images::ImageResolver,
};

use super::AppState;

/// Raw query string of `/attractions/{country}`. Numbers are read from their
/// leading digits (`3abc` is 3); values without any fall back to their defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub min_reviews: Option<String>,
    pub order: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
    pub region: Option<String>,
    pub county: Option<String>,
}

impl ListParams {
    /// Apply defaults and check the page size.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidInput`] when `limit` exceeds [`MAX_PAGE_SIZE`].
    pub fn into_query(self) -> Result<ListQuery> {
        let limit = leading_integer(self.limit.as_deref())
            .and_then(|limit| u32::try_from(limit).ok())
            .filter(|limit| *limit > 0)
            .unwrap_or(DEFAULT_PAGE_SIZE);
        if limit > MAX_PAGE_SIZE {
            return Err(ApiError::InvalidInput(format!(
                "limit {limit} exceeds the maximum of {MAX_PAGE_SIZE}"
            )));
        }

        Ok(ListQuery {
            min_reviews: leading_integer(self.min_reviews.as_deref())
                .filter(|min| *min >= 0)
                .unwrap_or(0),
            order: SortOrder::parse_or_default(self.order.as_deref()),
            page: leading_integer(self.page.as_deref())
                .and_then(|page| u32::try_from(page).ok())
                .filter(|page| *page > 0)
                .unwrap_or(DEFAULT_PAGE),
            limit,
            region: self.region.filter(|region| !region.is_empty()),
            county: self.county.filter(|county| !county.is_empty()),
        })
    }
}

/// Integer spelled by the optional sign and digits at the start of `raw`,
/// after leading whitespace. `None` when there are no digits or it overflows.
fn leading_integer(raw: Option<&str>) -> Option<i64> {
    let text = raw?.trim_start();
    let unsigned = text.strip_prefix(['+', '-']).unwrap_or(text);
    let sign_len = text.len() - unsigned.len();
    let digits = unsigned.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    text[..sign_len + digits].parse().ok()
}

pub async fn regions_handler(
    State(state): State<AppState>,
    Path(country): Path<String>,
) -> Result<Json<Vec<String>>> {
    let dataset = state.datasets.open(&country).await?;
    let regions = dataset.run(|conn| distinct_regions(conn, None)).await;
    dataset.close().await;

    Ok(Json(regions?))
}

pub async fn county_regions_handler(
    State(state): State<AppState>,
    Path((country, county)): Path<(String, String)>,
) -> Result<Json<Vec<String>>> {
    let dataset = state.datasets.open(&country).await?;
    let regions = dataset
        .run(move |conn| distinct_regions(conn, Some(&county)))
        .await;
    dataset.close().await;

    Ok(Json(regions?))
}

pub async fn counties_handler(
    State(state): State<AppState>,
    Path(country): Path<String>,
) -> Result<Json<Vec<String>>> {
    let dataset = state.datasets.open(&country).await?;
    let counties = dataset.run(distinct_counties).await;
    dataset.close().await;

    Ok(Json(counties?))
}

pub async fn attractions_handler(
    State(state): State<AppState>,
    Path(country): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<Json<Page<AttractionSummary>>> {
    let query = params.into_query()?;

    let dataset = state.datasets.open(&country).await?;
    let page = load_page(&dataset, &state.images, query).await;
    dataset.close().await;

    Ok(Json(page?))
}

async fn load_page(
    dataset: &Dataset,
    images: &ImageResolver,
    query: ListQuery,
) -> Result<Page<AttractionSummary>> {
    let mut page = dataset
        .run(move |conn| list_attractions(conn, &query))
        .await?;
    images
        .resolve_summaries(dataset.country(), &mut page.data)
        .await;
    Ok(page)
}

pub async fn attraction_handler(
    State(state): State<AppState>,
    Path((country, id)): Path<(String, String)>,
) -> Result<Json<Attraction>> {
    let dataset = state.datasets.open(&country).await?;
    let attraction = load_attraction(&dataset, &state.images, id).await;
    dataset.close().await;

    Ok(Json(attraction?))
}

async fn load_attraction(
    dataset: &Dataset,
    images: &ImageResolver,
    id: String,
) -> Result<Attraction> {
    let lookup = id.clone();
    let mut attraction = dataset
        .run(move |conn| find_attraction(conn, &lookup))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Attraction {id}")))?;
    images
        .resolve_attraction(dataset.country(), &mut attraction)
        .await;
    Ok(attraction)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> ListParams {
        let mut params = ListParams::default();
        for (key, value) in pairs {
            let value = Some((*value).to_string());
            match *key {
                "minReviews" => params.min_reviews = value,
                "order" => params.order = value,
                "page" => params.page = value,
                "limit" => params.limit = value,
                "region" => params.region = value,
                "county" => params.county = value,
                _ => {}
            }
        }
        params
    }

    #[test]
    fn missing_params_use_defaults() -> Result<()> {
        assert_eq!(ListParams::default().into_query()?, ListQuery::default());
        Ok(())
    }

    #[test]
    fn params_are_parsed() -> Result<()> {
        let query = params(&[
            ("minReviews", "100"),
            ("order", "reviews_asc"),
            ("page", "3"),
            ("limit", "5"),
            ("region", "Kansai"),
            ("county", "Kyoto"),
        ])
        .into_query()?;

        assert_eq!(
            query,
            ListQuery {
                min_reviews: 100,
                order: SortOrder::ReviewsAsc,
                page: 3,
                limit: 5,
                region: Some("Kansai".into()),
                county: Some("Kyoto".into()),
            }
        );
        assert_eq!(query.offset(), 10);
        Ok(())
    }

    #[test]
    fn malformed_params_fall_back() -> Result<()> {
        let query = params(&[
            ("minReviews", "-4"),
            ("order", "rating_sideways"),
            ("page", "0"),
            ("limit", "lots"),
            ("region", ""),
        ])
        .into_query()?;

        assert_eq!(query, ListQuery::default());
        Ok(())
    }

    #[test]
    fn numbers_are_read_from_their_leading_digits() -> Result<()> {
        let query = params(&[
            ("minReviews", "250 reviews"),
            ("page", "3abc"),
            ("limit", "7.5"),
        ])
        .into_query()?;

        assert_eq!(query.min_reviews, 250);
        assert_eq!(query.page, 3);
        assert_eq!(query.limit, 7);
        assert_eq!(leading_integer(Some("  +12x")), Some(12));
        assert_eq!(leading_integer(Some("-")), None);
        assert_eq!(leading_integer(Some("99999999999999999999")), None);
        Ok(())
    }

    #[test]
    fn offset_uses_the_requested_limit() -> Result<()> {
        let query = params(&[("page", "2"), ("limit", "100")]).into_query()?;
        assert_eq!(query.offset(), 100);
        Ok(())
    }

    #[test]
    fn oversized_pages_are_rejected() {
        assert!(matches!(
            params(&[("page", "2"), ("limit", "200")]).into_query(),
            Err(ApiError::InvalidInput(_))
        ));
    }
}
