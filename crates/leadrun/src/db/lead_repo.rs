//! Lead repository for the `leads` table.

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use super::{format_timestamp, parse_timestamp, Database, DatabaseError};
use crate::lead::{Lead, OutreachDraft, Tier};

/// Tier tallies of a job's scored leads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TierCounts {
    pub hot: u64,
    pub warm: u64,
    pub cold: u64,
    pub qualified: u64,
    pub disqualified: u64,
}

fn from_row(row: &Row<'_>) -> Result<Lead, DatabaseError> {
    let tier: Option<String> = row.get("tier")?;
    let tier = tier
        .map(|t| {
            Tier::parse(&t).ok_or(DatabaseError::InvalidValue {
                column: "tier",
                value: t,
            })
        })
        .transpose()?;
    let outreach: Option<String> = row.get("outreach")?;
    let outreach = outreach
        .map(|s| {
            serde_json::from_str::<OutreachDraft>(&s).map_err(|e| DatabaseError::Json {
                column: "outreach",
                source: e,
            })
        })
        .transpose()?;
    let raw_data: Option<String> = row.get("raw_data")?;
    let raw_data = raw_data
        .map(|s| {
            serde_json::from_str::<serde_json::Value>(&s).map_err(|e| DatabaseError::Json {
                column: "raw_data",
                source: e,
            })
        })
        .transpose()?;
    let enriched_at: Option<String> = row.get("enriched_at")?;
    let enriched_at = enriched_at
        .map(|s| parse_timestamp("enriched_at", &s))
        .transpose()?;
    let source_index: i64 = row.get("source_index")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(Lead {
        id: row.get("id")?,
        job_id: row.get("job_id")?,
        user_id: row.get("user_id")?,
        source_index: usize::try_from(source_index).map_err(|_| DatabaseError::InvalidValue {
            column: "source_index",
            value: source_index.to_string(),
        })?,
        place_id: row.get("place_id")?,
        name: row.get("name")?,
        phone: row.get("phone")?,
        normalized_phone: row.get("normalized_phone")?,
        email: row.get("email")?,
        whatsapp: row.get("whatsapp")?,
        website: row.get("website")?,
        address: row.get("address")?,
        maps_url: row.get("maps_url")?,
        category: row.get("category")?,
        rating: row.get("rating")?,
        review_count: row.get("review_count")?,
        price_level: row.get("price_level")?,
        is_claimed: row.get("is_claimed")?,
        years_in_business: row.get("years_in_business")?,
        photos_count: row.get("photos_count")?,
        owner_name: row.get("owner_name")?,
        linkedin: row.get("linkedin")?,
        facebook: row.get("facebook")?,
        instagram: row.get("instagram")?,
        twitter: row.get("twitter")?,
        website_reachable: row.get("website_reachable")?,
        has_contact_form: row.get("has_contact_form")?,
        enriched_at,
        score: row.get("score")?,
        tier,
        qualified: row.get("qualified")?,
        outreach,
        raw_data,
        created_at: parse_timestamp("created_at", &created_at)?,
        updated_at: parse_timestamp("updated_at", &updated_at)?,
    })
}

fn collect(
    conn: &rusqlite::Connection,
    sql: &str,
    job_id: &str,
) -> Result<Vec<Lead>, DatabaseError> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params![job_id])?;
    let mut leads = Vec::new();
    while let Some(row) = rows.next()? {
        leads.push(from_row(row)?);
    }
    Ok(leads)
}

/// Inserts a lead unless the job already stored one for the same source
/// index. Returns whether a row was written.
pub fn insert(db: &Database, lead: &Lead) -> Result<bool, DatabaseError> {
    let outreach = lead
        .outreach
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| DatabaseError::Json {
            column: "outreach",
            source: e,
        })?;
    let raw_data = lead.raw_data.as_ref().map(|v| v.to_string());

    db.with_conn(|conn| {
        let changed = conn.execute(
            "INSERT OR IGNORE INTO leads (id, job_id, user_id, source_index, place_id, name,
             phone, normalized_phone, email, whatsapp, website, address, maps_url, category,
             rating, review_count, price_level, is_claimed, years_in_business, photos_count,
             owner_name, linkedin, facebook, instagram, twitter, website_reachable,
             has_contact_form, score, tier, qualified, outreach, raw_data, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17,
             ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29, ?30, ?31, ?32, ?33, ?34)",
            params![
                lead.id,
                lead.job_id,
                lead.user_id,
                lead.source_index as i64,
                lead.place_id,
                lead.name,
                lead.phone,
                lead.normalized_phone,
                lead.email,
                lead.whatsapp,
                lead.website,
                lead.address,
                lead.maps_url,
                lead.category,
                lead.rating,
                lead.review_count,
                lead.price_level,
                lead.is_claimed,
                lead.years_in_business,
                lead.photos_count,
                lead.owner_name,
                lead.linkedin,
                lead.facebook,
                lead.instagram,
                lead.twitter,
                lead.website_reachable,
                lead.has_contact_form,
                lead.score,
                lead.tier.map(|t| t.as_str()),
                lead.qualified,
                outreach,
                raw_data,
                format_timestamp(lead.created_at),
                format_timestamp(lead.updated_at),
            ],
        )?;
        Ok(changed == 1)
    })
}

/// Whether the job already stored a lead for this source index.
pub fn exists_at(db: &Database, job_id: &str, source_index: usize) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let found: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM leads WHERE job_id = ?1 AND source_index = ?2)",
            params![job_id, source_index as i64],
            |r| r.get(0),
        )?;
        Ok(found)
    })
}

pub fn has_place_id(db: &Database, user_id: &str, place_id: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let found: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM leads WHERE user_id = ?1 AND place_id = ?2)",
            params![user_id, place_id],
            |r| r.get(0),
        )?;
        Ok(found)
    })
}

pub fn has_phone(db: &Database, user_id: &str, normalized_phone: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let found: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM leads WHERE user_id = ?1 AND normalized_phone = ?2)",
            params![user_id, normalized_phone],
            |r| r.get(0),
        )?;
        Ok(found)
    })
}

/// All leads of a job in discovery order.
pub fn list_for_job(db: &Database, job_id: &str) -> Result<Vec<Lead>, DatabaseError> {
    db.with_conn(|conn| {
        collect(
            conn,
            "SELECT * FROM leads WHERE job_id = ?1 ORDER BY source_index",
            job_id,
        )
    })
}

/// Qualified leads of a job in discovery order.
pub fn list_qualified(db: &Database, job_id: &str) -> Result<Vec<Lead>, DatabaseError> {
    db.with_conn(|conn| {
        collect(
            conn,
            "SELECT * FROM leads WHERE job_id = ?1 AND qualified = 1 ORDER BY source_index",
            job_id,
        )
    })
}

pub fn count_for_job(db: &Database, job_id: &str) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM leads WHERE job_id = ?1",
            params![job_id],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

pub fn count_qualified(db: &Database, job_id: &str) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM leads WHERE job_id = ?1 AND qualified = 1",
            params![job_id],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

/// Writes back the fields enrichment may change, including `enriched_at`.
pub fn update_enrichment(db: &Database, lead: &Lead) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE leads SET email = ?2, owner_name = ?3, linkedin = ?4, facebook = ?5,
             instagram = ?6, twitter = ?7, website_reachable = ?8, has_contact_form = ?9,
             enriched_at = ?10, updated_at = ?11
             WHERE id = ?1",
            params![
                lead.id,
                lead.email,
                lead.owner_name,
                lead.linkedin,
                lead.facebook,
                lead.instagram,
                lead.twitter,
                lead.website_reachable,
                lead.has_contact_form,
                lead.enriched_at.map(format_timestamp),
                format_timestamp(lead.updated_at),
            ],
        )?;
        Ok(())
    })
}

pub fn update_score(
    db: &Database,
    lead_id: &str,
    score: f64,
    tier: Tier,
    qualified: bool,
    now: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE leads SET score = ?2, tier = ?3, qualified = ?4, updated_at = ?5 WHERE id = ?1",
            params![lead_id, score, tier.as_str(), qualified, format_timestamp(now)],
        )?;
        Ok(())
    })
}

pub fn update_outreach(
    db: &Database,
    lead_id: &str,
    draft: &OutreachDraft,
    now: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    let json = serde_json::to_string(draft).map_err(|e| DatabaseError::Json {
        column: "outreach",
        source: e,
    })?;
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE leads SET outreach = ?2, updated_at = ?3 WHERE id = ?1",
            params![lead_id, json, format_timestamp(now)],
        )?;
        Ok(())
    })
}

pub fn tier_counts(db: &Database, job_id: &str) -> Result<TierCounts, DatabaseError> {
    db.with_conn(|conn| {
        let counts = conn.query_row(
            "SELECT
                COALESCE(SUM(CASE WHEN qualified = 1 AND tier = 'hot' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN qualified = 1 AND tier = 'warm' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN qualified = 1 AND tier = 'cold' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN qualified = 1 THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN qualified = 0 THEN 1 ELSE 0 END), 0)
             FROM leads WHERE job_id = ?1",
            params![job_id],
            |r| {
                Ok(TierCounts {
                    hot: r.get(0)?,
                    warm: r.get(1)?,
                    cold: r.get(2)?,
                    qualified: r.get(3)?,
                    disqualified: r.get(4)?,
                })
            },
        )?;
        Ok(counts)
    })
}
