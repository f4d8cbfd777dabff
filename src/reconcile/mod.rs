//! # Entity Reconciliation
//!
//! Maps validated upstream records onto the catalog tables. One call to
//! [`ShowReconciler::reconcile`] writes a show and everything hanging off it:
//!
//! 1. network and web channel
//! 2. the show row
//! 3. the genre set (create missing genres, add missing links, drop stale ones)
//! 4. seasons, each of which may resolve its own network
//! 5. episodes, linked to a season through the show's season numbers
//!
//! The caller owns the transaction; a failed call leaves nothing behind once
//! it is rolled back.

pub mod normalize;

use std::collections::HashMap;

use sea_orm::ConnectionTrait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::error::IngestError;
use crate::repositories::{
    EpisodeFields, EpisodeRepository, GenreRepository, NetworkRepository, OutletFields,
    SeasonFields, SeasonRepository, ShowFields, ShowRepository, WebChannelRepository,
};
use crate::upstream::{EpisodeRecord, OutletRecord, SeasonRecord, ShowRecord};
use normalize::{join_days, non_blank, parse_date, parse_time, parse_timestamp};

/// What one reconciled show touched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShowIngestSummary {
    /// Internal show id
    pub show_id: i32,
    /// Upstream show id
    pub external_id: i64,
    pub seasons_upserted: u32,
    pub episodes_upserted: u32,
    pub seasons_skipped: u32,
    pub episodes_skipped: u32,
    pub genres_linked: u32,
    pub genres_unlinked: u32,
}

impl ShowIngestSummary {
    /// Seasons and episodes rejected while the show itself succeeded.
    pub fn skipped_items(&self) -> u32 {
        self.seasons_skipped + self.episodes_skipped
    }
}

fn outlet_fields(outlet: Option<&OutletRecord>) -> Option<OutletFields> {
    let outlet = outlet?;
    let external_id = outlet.id?;
    let country = outlet.country.as_ref();
    Some(OutletFields {
        external_id,
        name: non_blank(outlet.name.as_deref()),
        country_name: non_blank(country.and_then(|c| c.name.as_deref())),
        country_code: non_blank(country.and_then(|c| c.code.as_deref())),
        country_timezone: non_blank(country.and_then(|c| c.timezone.as_deref())),
        official_site: non_blank(outlet.official_site.as_deref()),
    })
}

/// Checks the fields a show cannot be stored without.
pub fn validate_show(show: &ShowRecord) -> Result<(i64, String), IngestError> {
    let external_id = show
        .id
        .ok_or_else(|| IngestError::validation("show record has no id"))?;
    let name = non_blank(show.name.as_deref())
        .ok_or_else(|| IngestError::validation(format!("show {} has a blank name", external_id)))?;
    Ok((external_id, name))
}

fn show_fields(
    show: &ShowRecord,
    external_id: i64,
    name: String,
    network_id: Option<i32>,
    web_channel_id: Option<i32>,
) -> ShowFields {
    let schedule = show.schedule.as_ref();
    let externals = show.externals.as_ref();
    let image = show.image.as_ref();
    ShowFields {
        external_id,
        url: non_blank(show.url.as_deref()),
        name,
        show_type: non_blank(show.show_type.as_deref()),
        language: non_blank(show.language.as_deref()),
        status: non_blank(show.status.as_deref()),
        runtime: show.runtime,
        average_runtime: show.average_runtime,
        premiered: parse_date(show.premiered.as_deref()),
        ended: parse_date(show.ended.as_deref()),
        official_site: non_blank(show.official_site.as_deref()),
        schedule_time: parse_time(schedule.and_then(|s| s.time.as_deref())),
        schedule_days: schedule.and_then(|s| join_days(&s.days)),
        rating_average: show.rating.as_ref().and_then(|r| r.average),
        weight: show.weight,
        network_id,
        web_channel_id,
        externals_tvrage: externals.and_then(|e| e.tvrage),
        externals_thetvdb: externals.and_then(|e| e.thetvdb),
        externals_imdb: non_blank(externals.and_then(|e| e.imdb.as_deref())),
        image_medium: non_blank(image.and_then(|i| i.medium.as_deref())),
        image_original: non_blank(image.and_then(|i| i.original.as_deref())),
        summary: non_blank(show.summary.as_deref()),
        upstream_updated: show.updated,
    }
}

fn season_fields(season: &SeasonRecord, external_id: i64, show_id: i32, network_id: Option<i32>) -> SeasonFields {
    let image = season.image.as_ref();
    SeasonFields {
        external_id,
        show_id,
        url: non_blank(season.url.as_deref()),
        number: season.number,
        name: non_blank(season.name.as_deref()),
        episode_order: season.episode_order,
        premiere_date: parse_date(season.premiere_date.as_deref()),
        end_date: parse_date(season.end_date.as_deref()),
        network_id,
        image_medium: non_blank(image.and_then(|i| i.medium.as_deref())),
        image_original: non_blank(image.and_then(|i| i.original.as_deref())),
        summary: non_blank(season.summary.as_deref()),
    }
}

fn episode_fields(episode: &EpisodeRecord, external_id: i64, show_id: i32, season_id: Option<i32>) -> EpisodeFields {
    let image = episode.image.as_ref();
    EpisodeFields {
        external_id,
        show_id,
        season_id,
        url: non_blank(episode.url.as_deref()),
        name: non_blank(episode.name.as_deref()),
        season_number: episode.season,
        number: episode.number,
        episode_type: non_blank(episode.episode_type.as_deref()),
        airdate: parse_date(episode.airdate.as_deref()),
        airtime: parse_time(episode.airtime.as_deref()),
        airstamp: parse_timestamp(episode.airstamp.as_deref()),
        runtime: episode.runtime,
        rating_average: episode.rating.as_ref().and_then(|r| r.average),
        image_medium: non_blank(image.and_then(|i| i.medium.as_deref())),
        image_original: non_blank(image.and_then(|i| i.original.as_deref())),
        summary: non_blank(episode.summary.as_deref()),
    }
}

/// Writes one show graph through a borrowed connection or transaction.
pub struct ShowReconciler<'a, C> {
    conn: &'a C,
}

impl<'a, C: ConnectionTrait> ShowReconciler<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    /// Upserts the show with its outlets, genres, seasons and episodes.
    ///
    /// An invalid show fails the whole call before any write. Seasons and
    /// episodes without an id, and episodes naming a season the show does not
    /// have, are skipped and counted.
    #[instrument(skip_all, fields(show = ?show.id, seasons = seasons.len(), episodes = episodes.len()))]
    pub async fn reconcile(
        &self,
        show: &ShowRecord,
        seasons: &[SeasonRecord],
        episodes: &[EpisodeRecord],
    ) -> Result<ShowIngestSummary, IngestError> {
        let (external_id, name) = validate_show(show)?;

        let networks = NetworkRepository::new(self.conn);
        let network_id = match outlet_fields(show.network.as_ref()) {
            Some(fields) => Some(networks.upsert(fields).await?),
            None => None,
        };
        let web_channel_id = match outlet_fields(show.web_channel.as_ref()) {
            Some(fields) => Some(WebChannelRepository::new(self.conn).upsert(fields).await?),
            None => None,
        };

        let show_id = ShowRepository::new(self.conn)
            .upsert(show_fields(show, external_id, name, network_id, web_channel_id))
            .await?;

        let mut summary = ShowIngestSummary {
            show_id,
            external_id,
            ..ShowIngestSummary::default()
        };

        let genre_names: Vec<String> = show
            .genres
            .iter()
            .filter_map(|genre| non_blank(Some(genre.as_str())))
            .collect();
        let links = GenreRepository::new(self.conn)
            .sync_show_genres(show_id, &genre_names)
            .await?;
        summary.genres_linked = links.linked as u32;
        summary.genres_unlinked = links.unlinked as u32;

        let season_repo = SeasonRepository::new(self.conn);
        for season in seasons {
            let Some(season_external_id) = season.id else {
                debug!(number = ?season.number, "Skipping season without id");
                summary.seasons_skipped += 1;
                continue;
            };
            let season_network_id = match outlet_fields(season.network.as_ref()) {
                Some(fields) => Some(networks.upsert(fields).await?),
                None => None,
            };
            season_repo
                .upsert(season_fields(season, season_external_id, show_id, season_network_id))
                .await?;
            summary.seasons_upserted += 1;
        }

        let season_ids: HashMap<i32, i32> = season_repo.numbers_for_show(show_id).await?;
        let episode_repo = EpisodeRepository::new(self.conn);
        for episode in episodes {
            let Some(episode_external_id) = episode.id else {
                debug!("Skipping episode without id");
                summary.episodes_skipped += 1;
                continue;
            };
            let season_id = match episode.season {
                Some(number) => match season_ids.get(&number) {
                    Some(&season_id) => Some(season_id),
                    None => {
                        debug!(
                            episode = episode_external_id,
                            season = number,
                            "Skipping episode with unknown season"
                        );
                        summary.episodes_skipped += 1;
                        continue;
                    }
                },
                None => None,
            };
            episode_repo
                .upsert(episode_fields(episode, episode_external_id, show_id, season_id))
                .await?;
            summary.episodes_upserted += 1;
        }

        info!(
            show_id,
            seasons = summary.seasons_upserted,
            episodes = summary.episodes_upserted,
            skipped = summary.skipped_items(),
            "Show reconciled"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::records::{CountryRecord, ScheduleRecord};

    #[test]
    fn show_without_id_or_name_is_invalid() {
        let missing_id = ShowRecord {
            name: Some("Lost".into()),
            ..ShowRecord::default()
        };
        assert!(matches!(validate_show(&missing_id), Err(IngestError::Validation(_))));

        let blank_name = ShowRecord {
            id: Some(4),
            name: Some("   ".into()),
            ..ShowRecord::default()
        };
        assert!(matches!(validate_show(&blank_name), Err(IngestError::Validation(_))));
    }

    #[test]
    fn outlet_without_id_is_ignored() {
        let outlet = OutletRecord {
            name: Some("HBO".into()),
            ..OutletRecord::default()
        };
        assert_eq!(outlet_fields(Some(&outlet)), None);
        assert_eq!(outlet_fields(None), None);
    }

    #[test]
    fn maps_outlet_country() {
        let outlet = OutletRecord {
            id: Some(8),
            name: Some("HBO".into()),
            country: Some(CountryRecord {
                name: Some("United States".into()),
                code: Some("US".into()),
                timezone: Some("America/New_York".into()),
            }),
            official_site: Some(String::new()),
        };
        let fields = outlet_fields(Some(&outlet)).expect("mapped");
        assert_eq!(fields.external_id, 8);
        assert_eq!(fields.country_code.as_deref(), Some("US"));
        assert_eq!(fields.official_site, None);
    }

    #[test]
    fn empty_show_dates_become_absent() {
        let show = ShowRecord {
            id: Some(1),
            name: Some("Under the Dome".into()),
            premiered: Some(String::new()),
            ended: Some("2015-09-10".into()),
            schedule: Some(ScheduleRecord {
                time: Some(String::new()),
                days: vec!["Thursday".into()],
            }),
            ..ShowRecord::default()
        };
        let fields = show_fields(&show, 1, "Under the Dome".into(), None, None);
        assert_eq!(fields.premiered, None);
        assert!(fields.ended.is_some());
        assert_eq!(fields.schedule_time, None);
        assert_eq!(fields.schedule_days.as_deref(), Some("Thursday"));
    }
}
