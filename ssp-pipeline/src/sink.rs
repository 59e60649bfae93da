//! Point cloud consumer interface and the default in-memory sink.

use glam::Vec3;
use ssp_data::{ColorMap, Point, PositionMap, Pose};

/// Receives maps published by the pipeline, each at most once per tick.
pub trait PointCloudSink<P> {
    fn set_position_map(&mut self, map: P);
    fn set_color_map(&mut self, map: ColorMap);
}

/// Latest position and color maps plus the configured sensor pose.
///
/// The pose is carried for consumers only; positions are never transformed.
#[derive(Debug, Clone)]
pub struct PointCloud<P> {
    positions: Option<P>,
    colors: Option<ColorMap>,
    pose: Pose,
    position_revision: u64,
    color_revision: u64,
}

impl<P> PointCloud<P> {
    pub fn new(pose: Pose) -> Self {
        Self {
            positions: None,
            colors: None,
            pose,
            position_revision: 0,
            color_revision: 0,
        }
    }

    pub fn positions(&self) -> Option<&P> {
        self.positions.as_ref()
    }

    pub fn colors(&self) -> Option<&ColorMap> {
        self.colors.as_ref()
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    pub fn set_pose(&mut self, pose: Pose) {
        self.pose = pose;
    }

    /// Number of position maps received so far.
    pub fn position_revision(&self) -> u64 {
        self.position_revision
    }

    /// Number of color maps received so far.
    pub fn color_revision(&self) -> u64 {
        self.color_revision
    }
}

impl<P> Default for PointCloud<P> {
    fn default() -> Self {
        Self::new(Pose::default())
    }
}

impl<P> PointCloudSink<P> for PointCloud<P> {
    fn set_position_map(&mut self, map: P) {
        self.positions = Some(map);
        self.position_revision += 1;
    }

    fn set_color_map(&mut self, map: ColorMap) {
        self.colors = Some(map);
        self.color_revision += 1;
    }
}

impl PointCloud<PositionMap> {
    /// Colored points for every valid position.
    ///
    /// Points are white until a color map matching the position grid arrives.
    pub fn points(&self) -> Vec<Point> {
        let Some(positions) = &self.positions else {
            return Vec::new();
        };
        let colors = self
            .colors
            .as_ref()
            .filter(|colors| colors.grid() == positions.grid());

        positions
            .raw()
            .iter()
            .enumerate()
            .filter(|(_, p)| p[3] != 0.0)
            .map(|(i, p)| {
                let position = Vec3::new(p[0], p[1], p[2]);
                match colors.and_then(|c| c.pixel(i)) {
                    Some(color) => Point::new(position, color),
                    None => Point::white(position),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ssp_data::{DepthGrid, INVALID_POSITION};

    fn two_point_map() -> PositionMap {
        let grid = DepthGrid::new(2, 2);
        let positions = vec![
            [1.0, 2.0, 3.0, 1.0],
            INVALID_POSITION,
            INVALID_POSITION,
            [4.0, 5.0, 6.0, 1.0],
        ];
        PositionMap::from_raw(grid, positions).unwrap()
    }

    #[test]
    fn test_revisions_track_each_map() {
        let mut cloud = PointCloud::<PositionMap>::default();
        cloud.set_position_map(two_point_map());
        cloud.set_position_map(two_point_map());
        assert_eq!(cloud.position_revision(), 2);
        assert_eq!(cloud.color_revision(), 0);
        assert!(cloud.colors().is_none());
    }

    #[test]
    fn test_points_are_white_without_colors() {
        let mut cloud = PointCloud::<PositionMap>::default();
        assert!(cloud.points().is_empty());

        cloud.set_position_map(two_point_map());
        let points = cloud.points();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0], Point::white(Vec3::new(1.0, 2.0, 3.0)));
        assert_eq!(points[1].position, Vec3::new(4.0, 5.0, 6.0));
    }

    #[test]
    fn test_points_take_color_of_their_pixel() {
        let mut cloud = PointCloud::<PositionMap>::default();
        cloud.set_position_map(two_point_map());
        let rgba: Vec<u8> = (0..16).collect();
        cloud.set_color_map(ColorMap::from_rgba(DepthGrid::new(2, 2), rgba).unwrap());

        let points = cloud.points();
        assert_eq!(points[0].color, [0, 1, 2, 3]);
        assert_eq!(points[1].color, [12, 13, 14, 15]);
    }

    #[test]
    fn test_pose_is_carried_not_applied() {
        let pose = Pose::new(Vec3::new(10.0, 0.0, 0.0), Vec3::new(0.0, 90.0, 0.0));
        let mut cloud = PointCloud::<PositionMap>::new(pose);
        cloud.set_position_map(two_point_map());
        assert_eq!(cloud.pose(), pose);
        assert_eq!(cloud.points()[0].position, Vec3::new(1.0, 2.0, 3.0));
    }
}
