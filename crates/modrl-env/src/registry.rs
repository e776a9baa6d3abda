//! Sensor ownership and capability lookup.

use crate::components::{Capability, PointCloudProvider, Sensor, SkeletonProvider};

struct SensorEntry {
    owner: Option<usize>,
    sensor: Box<dyn Sensor>,
}

/// All sensors of an environment, each either owned by a robot or global.
///
/// Registration order is preserved; it is the order in which sensors are
/// updated and their observations merged.
#[derive(Default)]
pub struct SensorSet {
    entries: Vec<SensorEntry>,
}

impl SensorSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sensor attached to robot `owner`, or a global one for `None`.
    pub fn push(&mut self, owner: Option<usize>, sensor: Box<dyn Sensor>) {
        self.entries.push(SensorEntry { owner, sensor });
    }

    /// Number of sensors.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no sensor is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sensors in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn Sensor> {
        self.entries.iter().map(|e| e.sensor.as_ref())
    }

    /// Mutable sensors in registration order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Box<dyn Sensor>> {
        self.entries.iter_mut().map(|e| &mut e.sensor)
    }

    /// Sensors visible to robot `robot`.
    pub fn view(&self, robot: usize) -> SensorView<'_> {
        SensorView { set: self, robot }
    }
}

/// Read-only view of the sensors a single robot can use.
///
/// Robot-owned sensors shadow global ones when both provide a capability.
#[derive(Clone, Copy)]
pub struct SensorView<'a> {
    set: &'a SensorSet,
    robot: usize,
}

impl<'a> SensorView<'a> {
    fn candidates(&self) -> impl Iterator<Item = &'a dyn Sensor> + 'a {
        let robot = self.robot;
        let set: &'a SensorSet = self.set;
        let entries = &set.entries;
        let owned = entries.iter().filter(move |e| e.owner == Some(robot));
        let global = entries.iter().filter(|e| e.owner.is_none());
        owned.chain(global).map(|e| e.sensor.as_ref())
    }

    /// The robot whose view this is.
    pub fn robot(&self) -> usize {
        self.robot
    }

    /// First visible point-cloud provider.
    pub fn point_cloud(&self) -> Option<&'a dyn PointCloudProvider> {
        self.candidates().find_map(|s| s.as_point_cloud())
    }

    /// First visible skeleton provider.
    pub fn skeleton(&self) -> Option<&'a dyn SkeletonProvider> {
        self.candidates().find_map(|s| s.as_skeleton())
    }

    /// Whether some visible sensor offers `capability`.
    pub fn provides(&self, capability: Capability) -> bool {
        match capability {
            Capability::PointCloud => self.point_cloud().is_some(),
            Capability::Skeleton => self.skeleton().is_some(),
        }
    }
}
