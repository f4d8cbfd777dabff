//! Typed upstream catalog records.
//!
//! Every field is optional at this layer: upstream payloads are checked for
//! required identifiers at the reconciliation boundary, not while decoding.
//! Records serialize back to the same camelCase shape so they can travel
//! through activity inputs and history payloads unchanged.

use serde::{Deserialize, Serialize};

/// Show as returned by the index and show-details endpoints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ShowRecord {
    pub id: Option<i64>,
    pub url: Option<String>,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub show_type: Option<String>,
    pub language: Option<String>,
    pub genres: Vec<String>,
    pub status: Option<String>,
    pub runtime: Option<i32>,
    pub average_runtime: Option<i32>,
    pub premiered: Option<String>,
    pub ended: Option<String>,
    pub official_site: Option<String>,
    pub schedule: Option<ScheduleRecord>,
    pub rating: Option<RatingRecord>,
    pub weight: Option<i32>,
    pub network: Option<OutletRecord>,
    pub web_channel: Option<OutletRecord>,
    pub externals: Option<ExternalsRecord>,
    pub image: Option<ImageRecord>,
    pub summary: Option<String>,
    pub updated: Option<i64>,
}

/// Season as returned by `/shows/{id}/seasons`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SeasonRecord {
    pub id: Option<i64>,
    pub url: Option<String>,
    pub number: Option<i32>,
    pub name: Option<String>,
    pub episode_order: Option<i32>,
    pub premiere_date: Option<String>,
    pub end_date: Option<String>,
    pub network: Option<OutletRecord>,
    pub web_channel: Option<OutletRecord>,
    pub image: Option<ImageRecord>,
    pub summary: Option<String>,
}

/// Episode as returned by `/shows/{id}/episodes`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EpisodeRecord {
    pub id: Option<i64>,
    pub url: Option<String>,
    pub name: Option<String>,
    pub season: Option<i32>,
    pub number: Option<i32>,
    #[serde(rename = "type")]
    pub episode_type: Option<String>,
    pub airdate: Option<String>,
    pub airtime: Option<String>,
    pub airstamp: Option<String>,
    pub runtime: Option<i32>,
    pub rating: Option<RatingRecord>,
    pub image: Option<ImageRecord>,
    pub summary: Option<String>,
}

/// Network or web channel reference embedded in shows and seasons.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OutletRecord {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub country: Option<CountryRecord>,
    pub official_site: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CountryRecord {
    pub name: Option<String>,
    pub code: Option<String>,
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleRecord {
    pub time: Option<String>,
    pub days: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RatingRecord {
    pub average: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExternalsRecord {
    pub tvrage: Option<i64>,
    pub thetvdb: Option<i64>,
    pub imdb: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageRecord {
    pub medium: Option<String>,
    pub original: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_index_entry_with_nested_outlets() {
        let record: ShowRecord = serde_json::from_value(json!({
            "id": 1,
            "url": "https://www.tvmaze.com/shows/1/under-the-dome",
            "name": "Under the Dome",
            "type": "Scripted",
            "language": "English",
            "genres": ["Drama", "Science-Fiction", "Thriller"],
            "status": "Ended",
            "runtime": 60,
            "averageRuntime": 60,
            "premiered": "2013-06-24",
            "ended": "2015-09-10",
            "officialSite": "http://www.cbs.com/shows/under-the-dome/",
            "schedule": {"time": "22:00", "days": ["Thursday"]},
            "rating": {"average": 6.5},
            "weight": 98,
            "network": {
                "id": 2,
                "name": "CBS",
                "country": {"name": "United States", "code": "US", "timezone": "America/New_York"},
                "officialSite": "https://www.cbs.com/"
            },
            "webChannel": null,
            "externals": {"tvrage": 25988, "thetvdb": 264492, "imdb": "tt1553656"},
            "image": {"medium": "m.jpg", "original": "o.jpg"},
            "summary": "<p>Under the Dome</p>",
            "updated": 1704794065
        }))
        .expect("decodes");

        assert_eq!(record.id, Some(1));
        assert_eq!(record.show_type.as_deref(), Some("Scripted"));
        assert_eq!(record.average_runtime, Some(60));
        assert_eq!(record.genres.len(), 3);
        let network = record.network.expect("network");
        assert_eq!(network.id, Some(2));
        assert_eq!(
            network.country.and_then(|c| c.timezone).as_deref(),
            Some("America/New_York")
        );
        assert!(record.web_channel.is_none());
    }

    #[test]
    fn missing_fields_default_to_absent() {
        let record: EpisodeRecord = serde_json::from_value(json!({"id": 9})).expect("decodes");
        assert_eq!(record.id, Some(9));
        assert!(record.season.is_none());
        assert!(record.airdate.is_none());
    }

    #[test]
    fn serializes_back_to_upstream_shape() {
        let record = ShowRecord {
            id: Some(5),
            show_type: Some("Reality".to_string()),
            average_runtime: Some(30),
            ..ShowRecord::default()
        };
        let value = serde_json::to_value(&record).expect("serializes");
        assert_eq!(value["type"], "Reality");
        assert_eq!(value["averageRuntime"], 30);
    }
}
