// sv_game.rs - interface to the game module

use q2sim_common::cmodel::CModelContext;
use q2sim_common::common::ComResult;
use q2sim_common::q_shared::{Trace, Vec3};
use q2sim_game::game::AreaList;
use q2sim_game::game_import::GameImport;
use q2sim_game::g_local::Edict;

use crate::sv_world::SvWorld;

/// The server services handed to the game for one call. Borrows the
/// collision model and the area tree, never the entities themselves.
pub struct ServerImport<'a> {
    pub cm: &'a mut CModelContext,
    pub world: &'a mut SvWorld,
}

impl GameImport for ServerImport<'_> {
    fn trace(
        &mut self,
        edicts: &[Edict],
        start: &Vec3,
        mins: &Vec3,
        maxs: &Vec3,
        end: &Vec3,
        passent: Option<usize>,
        contentmask: i32,
    ) -> Trace {
        self.world.trace(self.cm, edicts, start, mins, maxs, end, passent, contentmask)
    }

    fn pointcontents(&mut self, edicts: &[Edict], point: &Vec3) -> i32 {
        self.world.point_contents(self.cm, edicts, point)
    }

    fn linkentity(&mut self, edicts: &mut [Edict], ent: usize) {
        self.world.link_edict(self.cm, edicts, ent);
    }

    fn unlinkentity(&mut self, edicts: &mut [Edict], ent: usize) {
        self.world.unlink_edict(edicts, ent);
    }

    fn area_edicts(
        &mut self,
        edicts: &[Edict],
        mins: &Vec3,
        maxs: &Vec3,
        maxcount: usize,
        areatype: AreaList,
    ) -> Vec<usize> {
        self.world.area_edicts(edicts, mins, maxs, maxcount, areatype)
    }

    fn set_area_portal_state(&mut self, portalnum: usize, open: bool) -> ComResult<()> {
        self.cm.set_area_portal_state(portalnum, open)
    }

    fn areas_connected(&mut self, area1: i32, area2: i32) -> bool {
        match (usize::try_from(area1), usize::try_from(area2)) {
            (Ok(a), Ok(b)) => self.cm.areas_connected(a, b),
            _ => false,
        }
    }
}
