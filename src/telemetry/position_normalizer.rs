use serde::{Deserialize, Serialize};

use super::RawCarFrame;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CarLocation {
    Ahead,
    Behind,
}

/// Another car's position relative to the reference car.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelativeCar {
    pub car_index: usize,
    pub driver_name: String,
    /// Meters to the reference car along the shortest arc, positive when ahead
    pub distance: f32,
    /// Car speed in m/s
    pub speed: f32,
    /// Car speed minus reference speed, positive when faster
    pub relative_speed: f32,
    pub location: CarLocation,
}

/// Normalizes every car in the frame against the reference car.
///
/// Returns an empty list when the track length or reference car is unknown,
/// when the track length is not a positive finite value, or when the
/// reference index is outside every car array. Output is ordered by car
/// index.
pub fn normalize(frame: &RawCarFrame) -> Vec<RelativeCar> {
    let (Some(track_length), Some(player_idx)) = (frame.track_length, frame.player_index) else {
        return Vec::new();
    };
    let total_cars = frame.car_count();
    if !(track_length.is_finite() && track_length > 0.) || player_idx >= total_cars {
        return Vec::new();
    }

    let track_length = f64::from(track_length);
    let player_dist = track_position(frame, player_idx, track_length);
    let player_speed = frame
        .player_speed
        .unwrap_or_else(|| frame.speed_at(player_idx));

    (0..total_cars)
        .filter(|idx| *idx != player_idx)
        .map(|idx| {
            let distance =
                shortest_arc(track_position(frame, idx, track_length) - player_dist, track_length)
                    as f32;
            let speed = frame.speed_at(idx);

            RelativeCar {
                car_index: idx,
                driver_name: frame
                    .driver_name
                    .get(&idx)
                    .cloned()
                    .unwrap_or_else(|| format!("Car {idx}")),
                distance,
                speed,
                relative_speed: speed - player_speed,
                location: if distance > 0. {
                    CarLocation::Ahead
                } else {
                    CarLocation::Behind
                },
            }
        })
        .collect()
}

/// Meters covered since the session start.
fn track_position(frame: &RawCarFrame, idx: usize, track_length: f64) -> f64 {
    (f64::from(frame.lap_at(idx)) + f64::from(frame.lap_fraction_at(idx))) * track_length
}

/// Wraps a linear offset onto the loop so that the result is the signed
/// shortest arc, within `[-track_length/2, track_length/2]`.
fn shortest_arc(offset: f64, track_length: f64) -> f64 {
    let half = track_length / 2.;
    if (-half..=half).contains(&offset) {
        return offset;
    }
    // offsets can span several laps for lapped cars
    let wrapped = offset.rem_euclid(track_length);
    if wrapped > half {
        wrapped - track_length
    } else {
        wrapped
    }
}

/// Normalized cars for one sample, as forwarded to spotting consumers.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Spotting {
    pub timestamp_ms: u128,
    pub cars: Vec<RelativeCar>,
}

impl Spotting {
    /// Closest car ahead of the reference car
    pub fn nearest_ahead(&self) -> Option<&RelativeCar> {
        self.cars
            .iter()
            .filter(|car| car.location == CarLocation::Ahead)
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
    }

    /// Closest car behind the reference car
    pub fn nearest_behind(&self) -> Option<&RelativeCar> {
        self.cars
            .iter()
            .filter(|car| car.location == CarLocation::Behind)
            .max_by(|a, b| a.distance.total_cmp(&b.distance))
    }

    /// Cars within `radius_m` meters either side, in car index order.
    pub fn nearby(&self, radius_m: f32) -> impl Iterator<Item = &RelativeCar> {
        self.cars
            .iter()
            .filter(move |car| car.distance.abs() <= radius_m)
    }
}
