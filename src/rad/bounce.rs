//! Radiosity bounces over the transfer lists.

use crate::float_types::Real;
use crate::rad::patch::Patch;
use crate::rad::transfers::TransferList;

/// Bounced light of one style.
#[derive(Debug, Clone, PartialEq)]
pub struct BounceResult {
    pub style: u8,
    /// Sum of every bounce per patch, without the direct light.
    pub total: Vec<[Real; 3]>,
    /// Light energy (light × area summed over channels and patches)
    /// arriving in each bounce.
    pub energy: Vec<Real>,
}

fn energy(light: &[[Real; 3]], patches: &[Patch]) -> Real {
    light
        .iter()
        .zip(patches)
        .map(|(l, p)| (l[0] + l[1] + l[2]) * p.area)
        .sum()
}

/// Shoots `seed` (the light that arrived on each patch) through the
/// transfers `bounces` times. Each pass gathers into a fresh buffer, which
/// becomes the next pass's source.
pub fn bounce_style(
    style: u8,
    seed: Vec<[Real; 3]>,
    patches: &[Patch],
    transfers: &[TransferList],
    bounces: usize,
) -> BounceResult {
    let mut total = vec![[0.0; 3]; patches.len()];
    let mut emit = seed;
    let mut energies = Vec::with_capacity(bounces + 1);
    energies.push(energy(&emit, patches));

    for _ in 0..bounces {
        let mut arrived = vec![[0.0; 3]; patches.len()];
        for (i, list) in transfers.iter().enumerate() {
            let from = &patches[i];
            let outgoing = [0, 1, 2].map(|c| emit[i][c] * from.reflectivity[c] * from.area);
            if outgoing == [0.0; 3] {
                continue;
            }
            for (j, fraction) in list.iter() {
                let area = patches[j].area;
                for c in 0..3 {
                    arrived[j][c] += outgoing[c] * fraction / area;
                }
            }
        }
        for (t, a) in total.iter_mut().zip(&arrived) {
            for c in 0..3 {
                t[c] += a[c];
            }
        }
        energies.push(energy(&arrived, patches));
        emit = arrived;
    }

    BounceResult {
        style,
        total,
        energy: energies,
    }
}

/// Bounces every style present in the patches' direct light.
pub fn bounce_light(
    patches: &[Patch],
    transfers: &[TransferList],
    bounces: usize,
) -> Vec<BounceResult> {
    let mut styles: Vec<u8> = patches
        .iter()
        .flat_map(|p| p.direct.active().map(|(s, _)| s))
        .collect();
    styles.sort_unstable();
    styles.dedup();

    styles
        .into_iter()
        .map(|style| {
            let seed = patches.iter().map(|p| p.direct.get(style)).collect();
            let result = bounce_style(style, seed, patches, transfers, bounces);
            tracing::debug!("style {style}: bounce energy {:?}", result.energy);
            result
        })
        .collect()
}
