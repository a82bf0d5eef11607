use crate::constants::{TMDB_BASE_URL, TMDB_IMAGE_BASE_URL};
use crate::error::{EnrichError, Result};
use crate::provider::TitleProvider;
use crate::types::{ContentType, ProviderRef, TitleMetadata};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

/// TMDB client covering the two endpoints the pipeline needs: the
/// find-by-external-id lookup and the per-title detail call.
pub struct TmdbProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl TmdbProvider {
    pub fn new(client: reqwest::Client, api_key: String) -> Self {
        Self {
            client,
            api_key,
            base_url: TMDB_BASE_URL.to_string(),
        }
    }

    async fn get_json(&self, path: &str, extra: &[(&str, &str)]) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let mut query: Vec<(&str, &str)> = vec![("api_key", self.api_key.as_str())];
        query.extend_from_slice(extra);

        let response = self.client.get(&url).query(&query).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(EnrichError::Api {
                message: format!("TMDB responded {} for {}", status.as_u16(), path),
            });
        }
        Ok(response.json().await?)
    }
}

/// Picks the provider ref out of a find-by-external-id response: a movie
/// match wins over a series match.
fn pick_provider_ref(data: &Value) -> Option<ProviderRef> {
    let first_id = |key: &str| {
        data[key]
            .as_array()
            .and_then(|results| results.first())
            .and_then(|result| result["id"].as_u64())
    };

    if let Some(tmdb_id) = first_id("movie_results") {
        return Some(ProviderRef {
            tmdb_id,
            content_type: ContentType::Movie,
        });
    }
    first_id("tv_results").map(|tmdb_id| ProviderRef {
        tmdb_id,
        content_type: ContentType::Series,
    })
}

/// Leading year component of a release-date string; 0 when absent/malformed.
fn parse_year(date: Option<&str>) -> i32 {
    date.and_then(|d| d.split('-').next())
        .and_then(|y| y.parse().ok())
        .unwrap_or(0)
}

fn parse_details(content_type: ContentType, data: &Value) -> Result<TitleMetadata> {
    // Movies carry `title`/`release_date`, series `name`/`first_air_date`.
    let title = data["title"]
        .as_str()
        .or_else(|| data["name"].as_str())
        .ok_or_else(|| EnrichError::MissingField("title not found".into()))?;
    let date = data["release_date"]
        .as_str()
        .or_else(|| data["first_air_date"].as_str());

    let genres = data["genres"]
        .as_array()
        .map(|genres| {
            genres
                .iter()
                .filter_map(|g| g["name"].as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default();

    let poster = data["poster_path"]
        .as_str()
        .map(|path| format!("{TMDB_IMAGE_BASE_URL}{path}"));

    // First video tagged as a trailer on YouTube, if any
    let trailer = data["videos"]["results"]
        .as_array()
        .and_then(|videos| {
            videos.iter().find(|v| {
                v["site"].as_str() == Some("YouTube") && v["type"].as_str() == Some("Trailer")
            })
        })
        .and_then(|v| v["key"].as_str().map(String::from));

    // TMDB reports 0.0 for titles nobody has rated yet
    let rating = data["vote_average"].as_f64().filter(|r| *r > 0.0);

    debug!("parsed {} details for '{}'", content_type, title);

    Ok(TitleMetadata {
        title: title.to_string(),
        year: parse_year(date),
        genres,
        poster,
        trailer,
        rating,
    })
}

#[async_trait]
impl TitleProvider for TmdbProvider {
    async fn find_by_imdb_id(&self, imdb_id: &str) -> Result<Option<ProviderRef>> {
        let data = self
            .get_json(
                &format!("/find/{imdb_id}"),
                &[("external_source", "imdb_id")],
            )
            .await?;
        let provider_ref = pick_provider_ref(&data);
        if let Some(ref r) = provider_ref {
            info!("resolved {} to tmdb {} ({})", imdb_id, r.tmdb_id, r.content_type);
        }
        Ok(provider_ref)
    }

    async fn title_details(&self, provider_ref: &ProviderRef) -> Result<TitleMetadata> {
        let path = format!(
            "/{}/{}",
            provider_ref.content_type.api_path(),
            provider_ref.tmdb_id
        );
        let data = self
            .get_json(&path, &[("append_to_response", "videos")])
            .await?;
        parse_details(provider_ref.content_type, &data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_year_takes_leading_component() {
        assert_eq!(parse_year(Some("1999-03-30")), 1999);
        assert_eq!(parse_year(Some("2024")), 2024);
        assert_eq!(parse_year(Some("")), 0);
        assert_eq!(parse_year(Some("soon-ish")), 0);
        assert_eq!(parse_year(None), 0);
    }

    #[test]
    fn test_movie_match_preferred_over_series() {
        let data = json!({
            "movie_results": [{"id": 603}],
            "tv_results": [{"id": 1396}],
        });
        let provider_ref = pick_provider_ref(&data).unwrap();
        assert_eq!(provider_ref.tmdb_id, 603);
        assert_eq!(provider_ref.content_type, ContentType::Movie);
    }

    #[test]
    fn test_series_match_when_no_movie() {
        let data = json!({
            "movie_results": [],
            "tv_results": [{"id": 1396}],
        });
        let provider_ref = pick_provider_ref(&data).unwrap();
        assert_eq!(provider_ref.tmdb_id, 1396);
        assert_eq!(provider_ref.content_type, ContentType::Series);
    }

    #[test]
    fn test_no_match_at_all() {
        let data = json!({"movie_results": [], "tv_results": []});
        assert!(pick_provider_ref(&data).is_none());
    }

    #[test]
    fn test_parse_movie_details_with_trailer() {
        let data = json!({
            "title": "The Matrix",
            "release_date": "1999-03-30",
            "genres": [{"id": 28, "name": "Action"}, {"id": 878, "name": "Science Fiction"}],
            "poster_path": "/abc.jpg",
            "vote_average": 8.2,
            "videos": {"results": [
                {"site": "YouTube", "type": "Featurette", "key": "feat1"},
                {"site": "YouTube", "type": "Trailer", "key": "vKQi3bBA1y8"},
                {"site": "YouTube", "type": "Trailer", "key": "later"},
            ]},
        });
        let metadata = parse_details(ContentType::Movie, &data).unwrap();
        assert_eq!(metadata.title, "The Matrix");
        assert_eq!(metadata.year, 1999);
        assert_eq!(metadata.genres, vec!["Action", "Science Fiction"]);
        assert_eq!(metadata.poster.as_deref(), Some("https://image.tmdb.org/t/p/w500/abc.jpg"));
        assert_eq!(metadata.trailer.as_deref(), Some("vKQi3bBA1y8"));
        assert_eq!(metadata.rating, Some(8.2));
    }

    #[test]
    fn test_parse_series_details_without_videos() {
        let data = json!({
            "name": "Breaking Bad",
            "first_air_date": "2008-01-20",
            "genres": [{"id": 18, "name": "Drama"}],
            "vote_average": 0.0,
        });
        let metadata = parse_details(ContentType::Series, &data).unwrap();
        assert_eq!(metadata.title, "Breaking Bad");
        assert_eq!(metadata.year, 2008);
        assert!(metadata.trailer.is_none());
        assert!(metadata.poster.is_none());
        assert!(metadata.rating.is_none());
    }

    #[test]
    fn test_details_without_title_is_an_error() {
        let data = json!({"release_date": "2001-01-01"});
        assert!(parse_details(ContentType::Movie, &data).is_err());
    }
}
