use std::f64::consts::{FRAC_PI_2, PI};

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

// A point in the sonar plane. The transmitter sits at the origin, azimuth 0 is boresight and
// azimuth grows counter-clockwise.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PolarPoint {
    pub radius: f64,
    pub azimuth: f64,
}

impl PolarPoint {
    pub const ORIGIN: PolarPoint = PolarPoint {
        radius: 0.,
        azimuth: 0.,
    };

    pub fn new(radius: f64, azimuth: f64) -> PolarPoint {
        PolarPoint { radius, azimuth }
    }

    pub fn to_cartesian(&self) -> Vector2<f64> {
        Vector2::new(
            self.radius * self.azimuth.cos(),
            self.radius * self.azimuth.sin(),
        )
    }

    pub fn from_cartesian(v: Vector2<f64>) -> PolarPoint {
        PolarPoint {
            radius: v.magnitude(),
            azimuth: f64::atan2(v[1], v[0]),
        }
    }
}

/// Law of cosines in polar form.
pub fn distance_polar(a: &PolarPoint, b: &PolarPoint) -> f64 {
    let sq = a.radius * a.radius + b.radius * b.radius
        - 2. * a.radius * b.radius * (a.azimuth - b.azimuth).cos();
    // Coincident points can round to a tiny negative square.
    sq.max(0.).sqrt()
}

pub fn distance_cartesian(a: &Vector2<f64>, b: &Vector2<f64>) -> f64 {
    (a - b).magnitude()
}

// Path length transmitter -> point -> receiver.
pub fn two_way_distance(
    transmitter: &PolarPoint,
    point: &PolarPoint,
    receiver: &PolarPoint,
) -> f64 {
    distance_polar(transmitter, point) + distance_polar(point, receiver)
}

// Propagation time along the full two-way path. The path already holds both legs, so it is
// not doubled again.
pub fn two_way_delay(
    transmitter: &PolarPoint,
    point: &PolarPoint,
    receiver: &PolarPoint,
    speed_of_sound: f64,
) -> f64 {
    two_way_distance(transmitter, point, receiver) / speed_of_sound
}

/// Receivers evenly spaced along the line through the origin perpendicular to boresight,
/// centred on the transmitter. Receiver 0 is the southernmost element (azimuth 3π/2).
pub fn uniform_linear_array(count: usize, spacing: f64) -> Vec<PolarPoint> {
    let mid = (count as f64 - 1.) / 2.;
    (0..count)
        .map(|i| {
            let offset = (i as f64 - mid) * spacing;
            if offset < 0. {
                PolarPoint::new(-offset, 3. * FRAC_PI_2)
            } else {
                PolarPoint::new(offset, FRAC_PI_2)
            }
        })
        .collect()
}

/**
Normalised array factor of a uniform linear array of `count` elements `spacing` apart,
steered to `steer`, evaluated at `azimuth`:

```text
|sin(N ψ/2) / (N sin(ψ/2))|,  ψ = 2π d (sin θ - sin θ0) / λ
```

Grating lobes show up wherever ψ is a multiple of 2π, which happens inside the visible
region once `spacing` exceeds half a wavelength.
*/
pub fn array_factor(count: usize, spacing: f64, wavelength: f64, steer: f64, azimuth: f64) -> f64 {
    let N = count as f64;
    let psi = 2. * PI * spacing * (azimuth.sin() - steer.sin()) / wavelength;
    let denom = N * (psi / 2.).sin();
    if denom.abs() < 1e-12 {
        1.
    } else {
        ((N * psi / 2.).sin() / denom).abs()
    }
}
