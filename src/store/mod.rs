// src/store/mod.rs
//! Store profile normalization: one sheet row → the JSON the landing page renders.

pub mod media;
pub mod places;

use std::collections::{BTreeMap, HashSet};

use anyhow::Result;
use serde::Serialize;

use crate::sheet::{find_store_row, parse_rows, SheetRow, SheetSource};

pub use media::{absolutize_asset, normalize_drive_url, RequestOrigin};
pub use places::PlacesClient;

/// Column suffixes of the per-language tag lists.
pub const LANG_SUFFIXES: [&str; 6] = ["En", "Cn", "Ko", "Fr", "Ja", "Es"];
pub const LIST_FIELD_BASES: [&str; 5] = ["top3", "features", "ambiance", "newItems", "cons"];

/// Column-letter headers some sheets use for the per-language `cons` lists.
fn cons_letter(suffix: &str) -> Option<&'static str> {
    match suffix {
        "En" => Some("AF"),
        "Cn" => Some("AG"),
        "Ko" => Some("AH"),
        "Fr" => Some("AI"),
        "Ja" => Some("AJ"),
        "Es" => Some("AK"),
        _ => None,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreProfile {
    pub storeid: String,
    pub name: String,
    pub place_id: String,
    pub logo_url: String,
    pub hero_url: String,
    pub place_photo_url: String,
    pub theme_blue: String,
    pub theme_on_blue: String,
    pub top3: String,
    pub features: String,
    pub ambiance: String,
    pub new_items: String,
    /// `top3En`, `consJa`, … one entry per language × list.
    #[serde(flatten)]
    pub localized: BTreeMap<String, String>,
}

/// Unify list separators (`、，；;`) to `,`, trim, drop empties, de-duplicate in order.
pub fn normalize_list_cell(raw: &str) -> String {
    let unified: String = raw
        .chars()
        .map(|c| match c {
            '、' | '，' | '；' | ';' => ',',
            other => other,
        })
        .collect();
    let mut seen = HashSet::new();
    unified
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(s.to_string()))
        .collect::<Vec<_>>()
        .join(",")
}

/// Split a normalized list back into tags.
pub fn split_list(normalized: &str) -> Vec<String> {
    normalized
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn normalize_row(row: &SheetRow, origin: &RequestOrigin, places: &PlacesClient) -> StoreProfile {
    let storeid = row.pick(&["StoreID"]).trim().to_string();
    let name = row.pick(&["StoreName", "Name"]).trim().to_string();
    let place_id = row.pick(&["PlaceID", "GooglePlaceID"]).trim().to_string();

    let logo_url = absolutize_asset(
        &normalize_drive_url(row.pick(&["LOGO", "Logo", "LogoUrl"])),
        origin,
    );
    let hero_url = absolutize_asset(
        &normalize_drive_url(row.pick(&["Hero圖片", "Hero", "HeroUrl", "HeroImage"])),
        origin,
    );

    let mut localized = BTreeMap::new();
    for suffix in LANG_SUFFIXES {
        for base in LIST_FIELD_BASES {
            let col = format!("{base}{suffix}");
            let mut aliases = vec![col.as_str()];
            if base == "cons" {
                aliases.extend(cons_letter(suffix));
            }
            localized.insert(col.clone(), normalize_list_cell(row.pick(&aliases)));
        }
    }

    let photo_ref = row.pick(&["placePhotoRef", "photoReference", "PlacePhotoRef"]);

    StoreProfile {
        name: if name.is_empty() { storeid.clone() } else { name },
        storeid,
        place_id,
        logo_url,
        hero_url,
        place_photo_url: places.photo_url(photo_ref),
        theme_blue: row.pick(&["AD", "ThemeBlue", "BrandColor"]).trim().to_string(),
        theme_on_blue: row
            .pick(&["AE", "ThemeOnBlue", "PrimaryTextColor"])
            .trim()
            .to_string(),
        top3: normalize_list_cell(row.pick(&["top3", "Top3Items"])),
        features: normalize_list_cell(row.pick(&["features", "StoreFeatures"])),
        ambiance: normalize_list_cell(row.pick(&["ambiance"])),
        new_items: normalize_list_cell(row.pick(&["newItems", "新品", "NewItems"])),
        localized,
    }
}

/// Read the sheet, find the store, normalize it and fill the place photo when possible.
/// `Ok(None)` means the store id is not in the sheet.
pub async fn load_profile(
    sheet: &dyn SheetSource,
    places: &PlacesClient,
    store_id: &str,
    origin: &RequestOrigin,
) -> Result<Option<StoreProfile>> {
    let csv = sheet.fetch_csv().await?;
    let rows = parse_rows(&csv)?;
    let Some(row) = find_store_row(&rows, store_id) else {
        return Ok(None);
    };

    let mut profile = normalize_row(row, origin, places);
    if profile.place_photo_url.is_empty() && !profile.place_id.is_empty() && places.has_key() {
        let photo_ref = places.first_photo_ref(&profile.place_id).await;
        profile.place_photo_url = places.photo_url(&photo_ref);
    }
    Ok(Some(profile))
}
