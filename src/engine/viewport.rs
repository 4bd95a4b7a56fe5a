use geo_types::Rect;

use crate::api::Camera;
use crate::entities::GeoPoint;
use crate::geo::has_moved;

/// Smallest rectangle (x = longitude, y = latitude) holding every point.
pub fn bounds_of<I>(points: I) -> Option<Rect<f64>>
where
    I: IntoIterator<Item = GeoPoint>,
{
    points.into_iter().fold(None, |bounds, point| {
        let (min_lng, min_lat, max_lng, max_lat) = match bounds {
            None => (
                point.longitude,
                point.latitude,
                point.longitude,
                point.latitude,
            ),
            Some(rect) => (
                rect.min().x.min(point.longitude),
                rect.min().y.min(point.latitude),
                rect.max().x.max(point.longitude),
                rect.max().y.max(point.latitude),
            ),
        };

        Some(Rect::new((min_lng, min_lat), (max_lng, max_lat)))
    })
}

/// Sole owner of the camera. Refits on pickup/destination changes only.
pub struct ViewportFitController<C: Camera> {
    camera: C,
    epsilon: f64,
    padding_px: u32,
    auto_fit_disabled: bool,
    previous_pickup: Option<GeoPoint>,
    previous_destination: Option<GeoPoint>,
}

impl<C: Camera> ViewportFitController<C> {
    pub fn new(camera: C, epsilon: f64, padding_px: u32, auto_fit_disabled: bool) -> Self {
        Self {
            camera,
            epsilon,
            padding_px,
            auto_fit_disabled,
            previous_pickup: None,
            previous_destination: None,
        }
    }

    pub fn set_auto_fit_disabled(&mut self, disabled: bool) {
        self.auto_fit_disabled = disabled;
    }

    pub fn auto_fit_disabled(&self) -> bool {
        self.auto_fit_disabled
    }

    pub fn camera(&self) -> &C {
        &self.camera
    }

    /// The driver is only used to size the bounds, never as a trigger.
    #[tracing::instrument(skip(self))]
    pub fn on_waypoints_changed(
        &mut self,
        pickup: Option<GeoPoint>,
        destination: Option<GeoPoint>,
        driver: Option<GeoPoint>,
    ) -> Option<Rect<f64>> {
        if self.auto_fit_disabled {
            return None;
        }

        if !has_moved(self.previous_pickup, pickup, self.epsilon)
            && !has_moved(self.previous_destination, destination, self.epsilon)
        {
            return None;
        }

        self.previous_pickup = pickup;
        self.previous_destination = destination;

        let bounds = bounds_of(pickup.into_iter().chain(destination).chain(driver))?;

        tracing::info!(?bounds, padding_px = self.padding_px, "fitting viewport");
        self.camera.fit_bounds(bounds, self.padding_px);

        Some(bounds)
    }

    /// Forgets the last fitted waypoints so the next selection refits.
    pub fn reset(&mut self) {
        self.previous_pickup = None;
        self.previous_destination = None;
    }
}

#[cfg(test)]
#[derive(Default)]
struct RecordingCamera {
    fits: Vec<(Rect<f64>, u32)>,
}

#[cfg(test)]
impl Camera for RecordingCamera {
    fn fit_bounds(&mut self, bounds: Rect<f64>, padding_px: u32) {
        self.fits.push((bounds, padding_px));
    }
}

#[test]
fn bounds_cover_every_point() {
    let bounds = bounds_of(vec![
        GeoPoint::new(1.1556, -77.0625),
        GeoPoint::new(1.1483, -77.0811),
        GeoPoint::new(1.16, -77.07),
    ])
    .unwrap();

    assert_eq!(bounds.min().y, 1.1483);
    assert_eq!(bounds.max().y, 1.16);
    assert_eq!(bounds.min().x, -77.0811);
    assert_eq!(bounds.max().x, -77.0625);
    assert!(bounds_of(Vec::new()).is_none());
}

#[test]
fn fits_once_per_waypoint_change_including_driver() {
    let mut controller = ViewportFitController::new(RecordingCamera::default(), 0.0001, 60, false);
    let pickup = Some(GeoPoint::new(1.1556, -77.0625));
    let destination = Some(GeoPoint::new(1.1483, -77.0811));
    let driver = Some(GeoPoint::new(1.17, -77.05));

    assert!(controller.on_waypoints_changed(pickup, None, driver).is_some());
    let bounds = controller
        .on_waypoints_changed(pickup, destination, driver)
        .unwrap();
    assert_eq!(bounds.max().y, 1.17);
    assert!(controller.on_waypoints_changed(pickup, destination, driver).is_none());

    assert_eq!(controller.camera().fits.len(), 2);
    assert_eq!(controller.camera().fits[1].1, 60);
}

#[test]
fn driver_only_changes_never_refit() {
    let mut controller = ViewportFitController::new(RecordingCamera::default(), 0.0001, 60, false);
    let pickup = Some(GeoPoint::new(1.1556, -77.0625));
    let destination = Some(GeoPoint::new(1.1483, -77.0811));

    controller.on_waypoints_changed(pickup, destination, None);
    for step in 0..20 {
        let driver = Some(GeoPoint::new(1.17 - step as f64 * 0.001, -77.05));
        assert!(controller.on_waypoints_changed(pickup, destination, driver).is_none());
    }

    assert_eq!(controller.camera().fits.len(), 1);
}

#[test]
fn sub_epsilon_waypoint_jitter_never_refits() {
    let mut controller = ViewportFitController::new(RecordingCamera::default(), 0.0001, 60, false);

    controller.on_waypoints_changed(Some(GeoPoint::new(1.1556, -77.0625)), None, None);
    controller.on_waypoints_changed(Some(GeoPoint::new(1.15565, -77.06254)), None, None);

    assert_eq!(controller.camera().fits.len(), 1);
}

#[test]
fn disabled_auto_fit_is_a_no_op() {
    let mut controller = ViewportFitController::new(RecordingCamera::default(), 0.0001, 60, true);

    assert!(controller
        .on_waypoints_changed(
            Some(GeoPoint::new(1.1556, -77.0625)),
            Some(GeoPoint::new(1.1483, -77.0811)),
            None
        )
        .is_none());
    assert!(controller.camera().fits.is_empty());

    controller.set_auto_fit_disabled(false);
    assert!(controller
        .on_waypoints_changed(Some(GeoPoint::new(1.1556, -77.0625)), None, None)
        .is_some());
}
