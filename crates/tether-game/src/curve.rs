use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use bevy::math::curve::{Curve, UnevenSampleAutoCurve};
use bevy::prelude::*;
use tether_sim_core::AnimState;
use thiserror::Error;

/// Local-space root displacement of a scripted animation over time.
///
/// Time runs from 0 to [`duration`](Self::duration); sampling outside that
/// range clamps.
pub trait DisplacementCurve: Debug + Send + Sync {
    fn duration(&self) -> f32;
    fn offset_at(&self, t: f32) -> Vec3;
}

impl<C> DisplacementCurve for C
where
    C: Curve<Vec3> + Debug + Send + Sync,
{
    fn duration(&self) -> f32 {
        self.domain().length()
    }

    fn offset_at(&self, t: f32) -> Vec3 {
        self.sample_clamped(self.domain().start() + t)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum CurveBuildError {
    #[error("invalid keyframes: {0}")]
    Keyframes(String),
}

/// Piecewise-linear curve through `(time, offset)` keyframes.
pub fn keyframe_curve(
    keyframes: impl IntoIterator<Item = (f32, Vec3)>,
) -> Result<Arc<dyn DisplacementCurve>, CurveBuildError> {
    let curve = UnevenSampleAutoCurve::new(keyframes)
        .map_err(|err| CurveBuildError::Keyframes(err.to_string()))?;
    Ok(Arc::new(curve))
}

/// Straight-line displacement reaching `end` after `duration_s`.
pub fn linear_curve(duration_s: f32, end: Vec3) -> Result<Arc<dyn DisplacementCurve>, CurveBuildError> {
    keyframe_curve([(0.0, Vec3::ZERO), (duration_s, end)])
}

#[derive(Debug, Error, PartialEq)]
pub enum MoverSetupError {
    #[error("no displacement curve registered for scripted animation {anim:?}")]
    MissingCurve { anim: AnimState },
    #[error("displacement curve for {anim:?} has unusable duration {duration}")]
    InvalidCurveDuration { anim: AnimState, duration: f32 },
}

/// Displacement curves for the scripted animations the server validates.
#[derive(Debug, Clone, Default, Resource)]
pub struct CurveLibrary {
    curves: HashMap<AnimState, Arc<dyn DisplacementCurve>>,
}

impl CurveLibrary {
    pub fn insert(&mut self, anim: AnimState, curve: Arc<dyn DisplacementCurve>) -> &mut Self {
        self.curves.insert(anim, curve);
        self
    }

    /// Missing entries mean the animation is not validated.
    pub fn get(&self, anim: AnimState) -> Option<Arc<dyn DisplacementCurve>> {
        self.curves.get(&anim).cloned()
    }

    /// Checks that every scripted animation a mover declares has a usable curve.
    pub fn require(&self, anims: &[AnimState]) -> Result<(), MoverSetupError> {
        for &anim in anims {
            let curve = self.curves.get(&anim).ok_or(MoverSetupError::MissingCurve { anim })?;
            let duration = curve.duration();
            if !duration.is_finite() || duration <= 0.0 {
                return Err(MoverSetupError::InvalidCurveDuration { anim, duration });
            }
        }
        Ok(())
    }
}
