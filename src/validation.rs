//! Request validation.
//!
//! Runs after admission and before any cache or compute work, so a
//! malformed request costs nothing beyond these checks.

use chrono::NaiveDate;

use crate::types::{FeatureVector, PredictRequest};
use crate::{HuginnError, Result};

/// Default upper bound on batch size.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 100;

/// Forecast horizons (days) the model was trained for.
pub const VALID_HORIZONS: [i32; 4] = [15, 30, 60, 90];

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Product families known to the model, sorted for binary search.
pub const VALID_FAMILIES: [&str; 33] = [
    "AUTOMOTIVE",
    "BABY CARE",
    "BEAUTY",
    "BEVERAGES",
    "BOOKS",
    "BREAD/BAKERY",
    "CELEBRATION",
    "CLEANING",
    "DAIRY",
    "DELI",
    "EGGS",
    "FROZEN FOODS",
    "GROCERY I",
    "GROCERY II",
    "HARDWARE",
    "HOME AND KITCHEN I",
    "HOME AND KITCHEN II",
    "HOME APPLIANCES",
    "HOME CARE",
    "LADIESWEAR",
    "LAWN AND GARDEN",
    "LINGERIE",
    "LIQUOR,WINE,BEER",
    "MAGAZINES",
    "MEATS",
    "PERSONAL CARE",
    "PET SUPPLIES",
    "PLAYERS AND ELECTRONICS",
    "POULTRY",
    "PREPARED FOODS",
    "PRODUCE",
    "SCHOOL AND OFFICE SUPPLIES",
    "SEAFOOD",
];

pub fn validate_store(store_nbr: i32) -> Result<()> {
    if store_nbr <= 0 {
        return Err(HuginnError::invalid(
            "INVALID_STORE",
            "store_nbr must be positive",
        ));
    }
    Ok(())
}

pub fn validate_family(family: &str) -> Result<()> {
    if family.is_empty() {
        return Err(HuginnError::invalid("MISSING_FAMILY", "family is required"));
    }
    if VALID_FAMILIES.binary_search(&family).is_err() {
        return Err(HuginnError::invalid(
            "INVALID_FAMILY",
            format!("invalid family name: {family}"),
        ));
    }
    Ok(())
}

/// Parse a `YYYY-MM-DD` date. Zero padding is required.
pub fn validate_date(date: &str) -> Result<NaiveDate> {
    if date.is_empty() {
        return Err(HuginnError::invalid("MISSING_DATE", "date is required"));
    }
    let invalid = || HuginnError::invalid("INVALID_DATE", "date must be in YYYY-MM-DD format");
    if date.len() != 10 {
        return Err(invalid());
    }
    NaiveDate::parse_from_str(date, DATE_FORMAT).map_err(|_| invalid())
}

pub fn validate_horizon(horizon: i32) -> Result<()> {
    if !VALID_HORIZONS.contains(&horizon) {
        return Err(HuginnError::invalid(
            "INVALID_HORIZON",
            "horizon must be 15, 30, 60, or 90",
        ));
    }
    Ok(())
}

pub fn validate_batch_size(size: usize, max: usize) -> Result<()> {
    if size == 0 {
        return Err(HuginnError::invalid(
            "EMPTY_BATCH",
            "predictions array is empty",
        ));
    }
    if size > max {
        return Err(HuginnError::invalid(
            "BATCH_TOO_LARGE",
            format!("batch size exceeds maximum of {max}"),
        ));
    }
    Ok(())
}

/// Validate the (store, family, date, horizon) tuple shared by every route.
pub fn validate_target(store_nbr: i32, family: &str, date: &str, horizon: i32) -> Result<()> {
    validate_store(store_nbr)?;
    validate_family(family)?;
    validate_date(date)?;
    validate_horizon(horizon)
}

/// Validate a full-feature request and build its feature vector.
pub fn validate_predict(request: &PredictRequest) -> Result<FeatureVector> {
    validate_target(
        request.store_nbr,
        &request.family,
        &request.date,
        request.horizon,
    )?;
    FeatureVector::from_slice(&request.features)
}

/// Prefix a validation error with the batch index it came from.
pub fn at_index(index: usize, err: HuginnError) -> HuginnError {
    match err {
        HuginnError::InvalidInput { code, message } => HuginnError::InvalidInput {
            code,
            message: format!("predictions[{index}]: {message}"),
        },
        other => other,
    }
}
