//! Fanning out markers that share a location.

use std::f64::consts::TAU;

use runclub_map_club_models::StableId;

use crate::cluster::ClusterMember;
use crate::projection::{LatLng, Pixel, project, unproject};

/// One fanned-out marker.
#[derive(Debug, Clone, PartialEq)]
pub struct SpiderLeg {
    /// Club identity.
    pub id: StableId,
    /// Where the leg starts (the cluster centroid).
    pub anchor: LatLng,
    /// Where the marker is drawn.
    pub position: LatLng,
    /// The club's real position.
    pub actual: LatLng,
}

/// Places `members` on a circle of `leg_length` pixels around `anchor`
/// at `zoom`, first member due east, evenly spaced counterclockwise.
#[must_use]
pub fn spiderfy(
    anchor: LatLng,
    members: &[ClusterMember],
    zoom: u8,
    leg_length: f64,
) -> Vec<SpiderLeg> {
    let z = f64::from(zoom);
    let center = project(anchor, z);
    #[allow(clippy::cast_precision_loss)]
    let step = TAU / members.len().max(1) as f64;

    members
        .iter()
        .enumerate()
        .map(|(i, member)| {
            #[allow(clippy::cast_precision_loss)]
            let angle = step * i as f64;
            let pixel = Pixel::new(
                leg_length.mul_add(angle.cos(), center.x),
                leg_length.mul_add(-angle.sin(), center.y),
            );
            SpiderLeg {
                id: member.id.clone(),
                anchor,
                position: unproject(pixel, z),
                actual: member.position,
            }
        })
        .collect()
}
