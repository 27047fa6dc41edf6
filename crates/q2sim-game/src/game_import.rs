//! Services the server provides to the game.
//!
//! The game owns the entity arena, so every query that needs entity data
//! is handed the slice explicitly. Entity references are arena indices.

use q2sim_common::common::ComResult;
use q2sim_common::q_shared::{Trace, Vec3};

use crate::game::AreaList;
use crate::g_local::Edict;

pub trait GameImport {
    /// Sweeps a box from `start` to `end` through the world and every
    /// solid entity except `passent` and the entities it owns or is owned by.
    fn trace(
        &mut self,
        edicts: &[Edict],
        start: &Vec3,
        mins: &Vec3,
        maxs: &Vec3,
        end: &Vec3,
        passent: Option<usize>,
        contentmask: i32,
    ) -> Trace;

    fn pointcontents(&mut self, edicts: &[Edict], point: &Vec3) -> i32;

    /// Links the entity into the world so traces and area queries can find
    /// it. Must be called whenever origin, bounds or solid change.
    fn linkentity(&mut self, edicts: &mut [Edict], ent: usize);

    fn unlinkentity(&mut self, edicts: &mut [Edict], ent: usize);

    /// Entities of `areatype` whose absolute bounds touch the box.
    fn area_edicts(
        &mut self,
        edicts: &[Edict],
        mins: &Vec3,
        maxs: &Vec3,
        maxcount: usize,
        areatype: AreaList,
    ) -> Vec<usize>;

    fn set_area_portal_state(&mut self, portalnum: usize, open: bool) -> ComResult<()>;

    fn areas_connected(&mut self, area1: i32, area2: i32) -> bool;
}
