use crate::VehicleId;

/// A simulated vehicle waiting to cross the junction.
#[derive(Clone, Debug)]
pub struct Vehicle {
    /// The vehicle's ID
    pub(crate) id: VehicleId,
    /// The vehicle's public name, reported to detectors.
    name: String,
    /// The index of the movement the vehicle is queued on.
    movement: usize,
    /// Whether the vehicle is a privileged (emergency) vehicle.
    privileged: bool,
    /// The accumulated time spent stopped, in s.
    waiting_time: f64,
    /// The number of frames that the vehicle has been stopped.
    stop_cnt: usize,
}

/// The attributes of a vehicle entering the simulation.
#[derive(Clone, Copy, Debug)]
pub struct VehicleAttributes<'a> {
    /// The sequence number used to name the vehicle.
    pub seq: usize,
    /// The index of the movement the vehicle will take.
    pub movement: usize,
    /// Whether the vehicle is a privileged (emergency) vehicle.
    pub privileged: bool,
    /// The marker included in the name of privileged vehicles.
    pub privileged_marker: &'a str,
}

impl Vehicle {
    /// Creates a new vehicle.
    pub(crate) fn new(id: VehicleId, attributes: &VehicleAttributes) -> Self {
        let name = if attributes.privileged {
            format!("{}_{}", attributes.privileged_marker, attributes.seq)
        } else {
            format!("veh_{}", attributes.seq)
        };
        Self {
            id,
            name,
            movement: attributes.movement,
            privileged: attributes.privileged,
            waiting_time: 0.0,
            stop_cnt: 0,
        }
    }

    /// Gets the vehicle's ID.
    pub fn id(&self) -> VehicleId {
        self.id
    }

    /// The vehicle's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The index of the movement the vehicle is queued on.
    pub fn movement(&self) -> usize {
        self.movement
    }

    /// Whether the vehicle is a privileged (emergency) vehicle.
    pub fn is_privileged(&self) -> bool {
        self.privileged
    }

    /// The accumulated time spent stopped, in s.
    pub fn waiting_time(&self) -> f64 {
        self.waiting_time
    }

    /// The number of frames the vehicle has been stopped.
    pub fn stop_count(&self) -> usize {
        self.stop_cnt
    }

    /// Records that the vehicle spent a frame of `dt` seconds stopped.
    pub(crate) fn wait(&mut self, dt: f64) {
        self.waiting_time += dt;
        self.stop_cnt += 1;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use slotmap::Key;

    #[test]
    fn names_mark_privileged_vehicles() {
        let attributes = |privileged| VehicleAttributes {
            seq: 4,
            movement: 2,
            privileged,
            privileged_marker: "rescue",
        };
        let normal = Vehicle::new(VehicleId::null(), &attributes(false));
        let rescue = Vehicle::new(VehicleId::null(), &attributes(true));
        assert_eq!(normal.name(), "veh_4");
        assert_eq!(rescue.name(), "rescue_4");
        assert!(rescue.is_privileged());
        assert_eq!(rescue.movement(), 2);
    }

    #[test]
    fn waiting_accumulates() {
        let mut vehicle = Vehicle::new(
            VehicleId::null(),
            &VehicleAttributes {
                seq: 0,
                movement: 0,
                privileged: false,
                privileged_marker: "rescue",
            },
        );
        vehicle.wait(1.0);
        vehicle.wait(1.0);
        assert_eq!(vehicle.waiting_time(), 2.0);
        assert_eq!(vehicle.stop_count(), 2);
    }
}
