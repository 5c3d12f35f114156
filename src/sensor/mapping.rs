// SPDX-License-Identifier: GPL-3.0-only

//! Coordinate mapping between camera, depth and color space
//!
//! Points the runtime cannot map come back as negative infinity, not as
//! errors.
//!
//! Batch methods check slice lengths before the native call: an output that
//! does not match its input is rejected with `E_INVALIDARG`.

use super::Sensor;
use crate::constants::{COLOR_HEIGHT, COLOR_WIDTH};
use crate::errors::{SensorError, SensorResult, check};
use crate::ffi::{self, CameraSpacePoint, ColorSpacePoint, DepthSpacePoint, PointF};

const COLOR_PIXELS: usize = (COLOR_WIDTH * COLOR_HEIGHT) as usize;

fn check_len(operation: &'static str, expected: usize, actual: usize) -> SensorResult<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(SensorError::failed(operation, ffi::E_INVALIDARG))
    }
}

impl Sensor {
    pub fn map_camera_point_to_depth_space(
        &self,
        point: CameraSpacePoint,
    ) -> SensorResult<DepthSpacePoint> {
        let mut out = DepthSpacePoint::default();
        let hr = self
            .bridge()
            .map_camera_point_to_depth_space(self.handle().raw(), point, &mut out);
        check("KCBMapCameraPointToDepthSpace", hr)?;
        Ok(out)
    }

    pub fn map_camera_point_to_color_space(
        &self,
        point: CameraSpacePoint,
    ) -> SensorResult<ColorSpacePoint> {
        let mut out = ColorSpacePoint::default();
        let hr = self
            .bridge()
            .map_camera_point_to_color_space(self.handle().raw(), point, &mut out);
        check("KCBMapCameraPointToColorSpace", hr)?;
        Ok(out)
    }

    /// `depth` is the reading at `point`, in millimetres
    pub fn map_depth_point_to_camera_space(
        &self,
        point: DepthSpacePoint,
        depth: u16,
    ) -> SensorResult<CameraSpacePoint> {
        let mut out = CameraSpacePoint::default();
        let hr = self.bridge().map_depth_point_to_camera_space(
            self.handle().raw(),
            point,
            depth,
            &mut out,
        );
        check("KCBMapDepthPointToCameraSpace", hr)?;
        Ok(out)
    }

    /// Project a whole depth frame; `out` must match `depth` in length
    pub fn map_depth_frame_to_camera_space(
        &self,
        depth: &[u16],
        out: &mut [CameraSpacePoint],
    ) -> SensorResult<()> {
        const OPERATION: &str = "KCBMapDepthFrameToCameraSpace";
        check_len(OPERATION, depth.len(), out.len())?;
        let hr = self
            .bridge()
            .map_depth_frame_to_camera_space(self.handle().raw(), depth, out);
        check(OPERATION, hr)
    }

    pub fn map_depth_point_to_color_space(
        &self,
        point: DepthSpacePoint,
        depth: u16,
    ) -> SensorResult<ColorSpacePoint> {
        let mut out = ColorSpacePoint::default();
        let hr = self.bridge().map_depth_point_to_color_space(
            self.handle().raw(),
            point,
            depth,
            &mut out,
        );
        check("KCBMapDepthPointToColorSpace", hr)?;
        Ok(out)
    }

    pub fn map_camera_points_to_depth_space(
        &self,
        points: &[CameraSpacePoint],
        out: &mut [DepthSpacePoint],
    ) -> SensorResult<()> {
        const OPERATION: &str = "KCBMapCameraPointsToDepthSpace";
        check_len(OPERATION, points.len(), out.len())?;
        let hr = self
            .bridge()
            .map_camera_points_to_depth_space(self.handle().raw(), points, out);
        check(OPERATION, hr)
    }

    pub fn map_camera_points_to_color_space(
        &self,
        points: &[CameraSpacePoint],
        out: &mut [ColorSpacePoint],
    ) -> SensorResult<()> {
        const OPERATION: &str = "KCBMapCameraPointsToColorSpace";
        check_len(OPERATION, points.len(), out.len())?;
        let hr = self
            .bridge()
            .map_camera_points_to_color_space(self.handle().raw(), points, out);
        check(OPERATION, hr)
    }

    /// `depths[i]` is the reading at `points[i]`
    pub fn map_depth_points_to_camera_space(
        &self,
        points: &[DepthSpacePoint],
        depths: &[u16],
        out: &mut [CameraSpacePoint],
    ) -> SensorResult<()> {
        const OPERATION: &str = "KCBMapDepthPointsToCameraSpace";
        check_len(OPERATION, points.len(), depths.len())?;
        check_len(OPERATION, points.len(), out.len())?;
        let hr = self.bridge().map_depth_points_to_camera_space(
            self.handle().raw(),
            points,
            depths,
            out,
        );
        check(OPERATION, hr)
    }

    /// `depths[i]` is the reading at `points[i]`
    pub fn map_depth_points_to_color_space(
        &self,
        points: &[DepthSpacePoint],
        depths: &[u16],
        out: &mut [ColorSpacePoint],
    ) -> SensorResult<()> {
        const OPERATION: &str = "KCBMapDepthPointsToColorSpace";
        check_len(OPERATION, points.len(), depths.len())?;
        check_len(OPERATION, points.len(), out.len())?;
        let hr = self.bridge().map_depth_points_to_color_space(
            self.handle().raw(),
            points,
            depths,
            out,
        );
        check(OPERATION, hr)
    }

    /// Color position of every depth pixel; `out` must match `depth` in length
    pub fn map_depth_frame_to_color_space(
        &self,
        depth: &[u16],
        out: &mut [ColorSpacePoint],
    ) -> SensorResult<()> {
        const OPERATION: &str = "KCBMapDepthFrameToColorSpace";
        check_len(OPERATION, depth.len(), out.len())?;
        let hr = self
            .bridge()
            .map_depth_frame_to_color_space(self.handle().raw(), depth, out);
        check(OPERATION, hr)
    }

    /// Depth position behind every color pixel
    ///
    /// `out` holds one point per color pixel (1920 x 1080).
    pub fn map_color_frame_to_depth_space(
        &self,
        depth: &[u16],
        out: &mut [DepthSpacePoint],
    ) -> SensorResult<()> {
        const OPERATION: &str = "KCBMapColorFrameToDepthSpace";
        check_len(OPERATION, COLOR_PIXELS, out.len())?;
        let hr = self
            .bridge()
            .map_color_frame_to_depth_space(self.handle().raw(), depth, out);
        check(OPERATION, hr)
    }

    /// Camera-space position of every color pixel
    ///
    /// `out` holds one point per color pixel (1920 x 1080).
    pub fn map_color_frame_to_camera_space(
        &self,
        depth: &[u16],
        out: &mut [CameraSpacePoint],
    ) -> SensorResult<()> {
        const OPERATION: &str = "KCBMapColorFrameToCameraSpace";
        check_len(OPERATION, COLOR_PIXELS, out.len())?;
        let hr = self
            .bridge()
            .map_color_frame_to_camera_space(self.handle().raw(), depth, out);
        check(OPERATION, hr)
    }

    /// Per-pixel rays of the depth camera
    ///
    /// Entry `i` times the depth of pixel `i` in metres is that pixel's camera
    /// space X and Y.
    pub fn depth_frame_to_camera_space_table(&self) -> SensorResult<Vec<PointF>> {
        let mut table = Vec::new();
        let hr = self
            .bridge()
            .depth_frame_to_camera_space_table(self.handle().raw(), &mut table);
        check("GetDepthFrameToCameraSpaceTable", hr)?;
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use crate::backends::{EmulatedBridge, EmulatorConfig};
    use crate::constants::{DEPTH_HEIGHT, DEPTH_WIDTH};
    use crate::ffi::{self, CameraSpacePoint, ColorSpacePoint, DepthSpacePoint};
    use crate::sensor::Sensor;
    use std::sync::Arc;

    fn sensor() -> Sensor {
        Sensor::open_default(Arc::new(EmulatedBridge::new(EmulatorConfig::default()))).unwrap()
    }

    #[test]
    fn test_point_on_optical_axis() {
        let sensor = sensor();
        let point = CameraSpacePoint { x: 0.0, y: 0.0, z: 2.0 };
        let depth = sensor.map_camera_point_to_depth_space(point).unwrap();
        assert!((depth.x - crate::constants::DEPTH_CX).abs() < 1e-3);
        assert!((depth.y - crate::constants::DEPTH_CY).abs() < 1e-3);
    }

    #[test]
    fn test_depth_point_round_trip() {
        let sensor = sensor();
        let pixel = DepthSpacePoint { x: 40.0, y: 380.0 };
        let camera = sensor.map_depth_point_to_camera_space(pixel, 1200).unwrap();
        let back = sensor.map_camera_point_to_depth_space(camera).unwrap();
        assert!((back.x - pixel.x).abs() < 1e-2, "x drifted to {}", back.x);
        assert!((back.y - pixel.y).abs() < 1e-2, "y drifted to {}", back.y);
    }

    #[test]
    fn test_frame_mapping_length_mismatch() {
        let sensor = sensor();
        let depth = vec![1000u16; 16];
        let mut out = vec![CameraSpacePoint::default(); 8];
        let err = sensor
            .map_depth_frame_to_camera_space(&depth, &mut out)
            .unwrap_err();
        assert_eq!(err.hresult(), Some(ffi::E_INVALIDARG));
    }

    #[test]
    fn test_frame_mapping_full_frame() {
        let sensor = sensor();
        let len = (DEPTH_WIDTH * DEPTH_HEIGHT) as usize;
        let depth = vec![2000u16; len];
        let mut out = vec![CameraSpacePoint::default(); len];
        sensor
            .map_depth_frame_to_camera_space(&depth, &mut out)
            .unwrap();
        assert!(out.iter().all(|p| (p.z - 2.0).abs() < 1e-6));
    }

    #[test]
    fn test_depth_point_to_color_matches_camera_path() {
        let sensor = sensor();
        let pixel = DepthSpacePoint { x: 300.0, y: 150.0 };
        let direct = sensor.map_depth_point_to_color_space(pixel, 2500).unwrap();
        let camera = sensor.map_depth_point_to_camera_space(pixel, 2500).unwrap();
        let via_camera = sensor.map_camera_point_to_color_space(camera).unwrap();
        assert!((direct.x - via_camera.x).abs() < 1e-3);
        assert!((direct.y - via_camera.y).abs() < 1e-3);
    }

    #[test]
    fn test_batch_matches_single_points() {
        let sensor = sensor();
        let points = [
            CameraSpacePoint { x: -0.3, y: 0.1, z: 1.5 },
            CameraSpacePoint { x: 0.4, y: -0.2, z: 3.0 },
        ];
        let mut depth = [DepthSpacePoint::default(); 2];
        let mut color = [ColorSpacePoint::default(); 2];
        sensor.map_camera_points_to_depth_space(&points, &mut depth).unwrap();
        sensor.map_camera_points_to_color_space(&points, &mut color).unwrap();

        for (i, point) in points.iter().enumerate() {
            assert_eq!(depth[i], sensor.map_camera_point_to_depth_space(*point).unwrap());
            assert_eq!(color[i], sensor.map_camera_point_to_color_space(*point).unwrap());
        }

        let mut camera = [CameraSpacePoint::default(); 2];
        sensor
            .map_depth_points_to_camera_space(&depth, &[1500, 3000], &mut camera)
            .unwrap();
        assert!((camera[1].z - 3.0).abs() < 1e-6);

        let mut back = [ColorSpacePoint::default(); 2];
        sensor
            .map_depth_points_to_color_space(&depth, &[1500, 3000], &mut back)
            .unwrap();
        assert!((back[0].x - color[0].x).abs() < 0.5, "{} vs {}", back[0].x, color[0].x);
    }

    #[test]
    fn test_batch_length_checks() {
        let sensor = sensor();
        let points = [DepthSpacePoint::default(); 3];
        let mut out = [CameraSpacePoint::default(); 3];
        let err = sensor
            .map_depth_points_to_camera_space(&points, &[1000, 1000], &mut out)
            .unwrap_err();
        assert_eq!(err.hresult(), Some(ffi::E_INVALIDARG));

        let mut short = [ColorSpacePoint::default(); 1];
        let camera = [CameraSpacePoint::default(); 2];
        let err = sensor
            .map_camera_points_to_color_space(&camera, &mut short)
            .unwrap_err();
        assert_eq!(err.hresult(), Some(ffi::E_INVALIDARG));

        let depth = vec![1000u16; (DEPTH_WIDTH * DEPTH_HEIGHT) as usize];
        let mut wrong = vec![DepthSpacePoint::default(); depth.len()];
        let err = sensor
            .map_color_frame_to_depth_space(&depth, &mut wrong)
            .unwrap_err();
        assert_eq!(err.hresult(), Some(ffi::E_INVALIDARG));
    }

    #[test]
    fn test_depth_frame_to_color_frame() {
        let sensor = sensor();
        let len = (DEPTH_WIDTH * DEPTH_HEIGHT) as usize;
        let depth = vec![2000u16; len];
        let mut out = vec![ColorSpacePoint::default(); len];
        sensor.map_depth_frame_to_color_space(&depth, &mut out).unwrap();

        let expected = sensor
            .map_depth_point_to_color_space(DepthSpacePoint { x: 5.0, y: 1.0 }, 2000)
            .unwrap();
        assert_eq!(out[DEPTH_WIDTH as usize + 5], expected);
    }

    #[test]
    fn test_table_scales_by_depth() {
        let sensor = sensor();
        let table = sensor.depth_frame_to_camera_space_table().unwrap();
        assert_eq!(table.len(), (DEPTH_WIDTH * DEPTH_HEIGHT) as usize);

        let index = 100 * DEPTH_WIDTH as usize + 200;
        let pixel = DepthSpacePoint { x: 200.0, y: 100.0 };
        let camera = sensor.map_depth_point_to_camera_space(pixel, 1800).unwrap();
        assert!((table[index].x * 1.8 - camera.x).abs() < 1e-5);
        assert!((table[index].y * 1.8 - camera.y).abs() < 1e-5);
    }
}
