//! Unit conversions for derived features and spherical mercator projection.
//!
//! Conversions rewrite one derived feature of every point in place.

use crate::TrajectoryTable;

/// Radius of the WGS 84 / Pseudo-Mercator sphere (EPSG:3857), in meters.
const MERCATOR_RADIUS: f64 = 6_378_137.0;

/// Derived feature a conversion applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    DistToPrev,
    DistToNext,
    DistPrevToNext,
    TimeToPrev,
    TimeToNext,
    SpeedToPrev,
    SpeedToNext,
}

impl Feature {
    fn slot<'a>(&self, p: &'a mut crate::TrajectoryPoint) -> &'a mut f64 {
        match self {
            Feature::DistToPrev => &mut p.dist_to_prev,
            Feature::DistToNext => &mut p.dist_to_next,
            Feature::DistPrevToNext => &mut p.dist_prev_to_next,
            Feature::TimeToPrev => &mut p.time_to_prev,
            Feature::TimeToNext => &mut p.time_to_next,
            Feature::SpeedToPrev => &mut p.speed_to_prev,
            Feature::SpeedToNext => &mut p.speed_to_next,
        }
    }
}

/// Supported conversions. Each is a constant factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conversion {
    MetersPerSecondToKmh,
    KmhToMetersPerSecond,
    MetersToKilometers,
    KilometersToMeters,
    SecondsToMinutes,
    MinutesToSeconds,
    MinutesToHours,
    HoursToMinutes,
    SecondsToHours,
    HoursToSeconds,
}

impl Conversion {
    pub fn factor(&self) -> f64 {
        match self {
            Conversion::MetersPerSecondToKmh => 3.6,
            Conversion::KmhToMetersPerSecond => 1.0 / 3.6,
            Conversion::MetersToKilometers => 1.0 / 1000.0,
            Conversion::KilometersToMeters => 1000.0,
            Conversion::SecondsToMinutes => 1.0 / 60.0,
            Conversion::MinutesToSeconds => 60.0,
            Conversion::MinutesToHours => 1.0 / 60.0,
            Conversion::HoursToMinutes => 60.0,
            Conversion::SecondsToHours => 1.0 / 3600.0,
            Conversion::HoursToSeconds => 3600.0,
        }
    }

    pub fn apply(&self, value: f64) -> f64 {
        value * self.factor()
    }
}

/// Convert one derived feature of every point in the table.
pub fn convert_feature(table: &mut TrajectoryTable, feature: Feature, conversion: Conversion) {
    let factor = conversion.factor();
    for point in table.points_mut() {
        *feature.slot(point) *= factor;
    }
}

/// Longitude in degrees to EPSG:3857 x in meters.
pub fn lon_to_x(lon: f64) -> f64 {
    MERCATOR_RADIUS * lon.to_radians()
}

/// Latitude in degrees to EPSG:3857 y in meters.
pub fn lat_to_y(lat: f64) -> f64 {
    MERCATOR_RADIUS * (std::f64::consts::FRAC_PI_4 + lat.to_radians() / 2.0).tan().ln()
}

/// EPSG:3857 x in meters to longitude in degrees.
pub fn x_to_lon(x: f64) -> f64 {
    (x / MERCATOR_RADIUS).to_degrees()
}

/// EPSG:3857 y in meters to latitude in degrees.
pub fn y_to_lat(y: f64) -> f64 {
    (y / MERCATOR_RADIUS).sinh().atan().to_degrees()
}
