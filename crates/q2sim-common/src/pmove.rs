// pmove.rs - player movement shared by client prediction and the server
//
// Same state and command in, same state out. Nothing carries over between
// calls except what is stored in `PmoveState`.

use log::debug;

use crate::q_shared::*;

const STEPSIZE: f32 = 18.0;
const STOP_EPSILON: f32 = 0.1;
const MIN_STEP_NORMAL: f32 = 0.7;
const MAX_CLIP_PLANES: usize = 5;
const OVERCLIP: f32 = 1.01;

pub const PM_STOPSPEED: f32 = 100.0;
pub const PM_MAXSPEED: f32 = 300.0;
pub const PM_DUCKSPEED: f32 = 100.0;
pub const PM_ACCELERATE: f32 = 10.0;
pub const PM_AIRACCELERATE: f32 = 0.0;
pub const PM_WATERACCELERATE: f32 = 10.0;
pub const PM_FRICTION: f32 = 6.0;
pub const PM_WATERFRICTION: f32 = 1.0;
pub const PM_WATERSPEED: f32 = 400.0;

/// Order in which the rounding jitters are tried when snapping. Bit n set
/// means "nudge axis n one eighth away from zero".
const JITTERBITS: [u8; 8] = [0, 4, 1, 2, 3, 5, 6, 7];

/// World queries the movement code needs. The server answers them from the
/// collision model plus entities, a predicting client from its own copy.
pub trait PmoveCallbacks {
    fn trace(&mut self, start: &Vec3, mins: &Vec3, maxs: &Vec3, end: &Vec3) -> Trace;
    fn point_contents(&mut self, point: &Vec3) -> i32;
}

/// Float working copies, rebuilt from scratch each call.
#[derive(Default)]
struct Scratch {
    origin: Vec3,
    velocity: Vec3,
    forward: Vec3,
    right: Vec3,
    up: Vec3,
    frametime: f32,
    groundsurface: Option<CSurface>,
    groundplane: CPlane,
    groundcontents: i32,
    previous_origin: [i16; 3],
    ladder: bool,
}

struct PlayerMove<'a, C: PmoveCallbacks + ?Sized> {
    pm: &'a mut PmoveData,
    pml: Scratch,
    world: &'a mut C,
}

fn clip_velocity(input: &Vec3, normal: &Vec3, overbounce: f32) -> Vec3 {
    let backoff = dot_product(input, normal) * overbounce;
    let mut out = [0.0f32; 3];
    for i in 0..3 {
        out[i] = input[i] - normal[i] * backoff;
        if out[i] > -STOP_EPSILON && out[i] < STOP_EPSILON {
            out[i] = 0.0;
        }
    }
    out
}

fn fixed_to_float(v: &[i16; 3]) -> Vec3 {
    [v[0] as f32 * 0.125, v[1] as f32 * 0.125, v[2] as f32 * 0.125]
}

impl<C: PmoveCallbacks + ?Sized> PlayerMove<'_, C> {
    fn trace(&mut self, start: &Vec3, end: &Vec3) -> Trace {
        let (mins, maxs) = (self.pm.mins, self.pm.maxs);
        self.world.trace(start, &mins, &maxs, end)
    }

    fn touch(&mut self, ent: Option<usize>) {
        if let Some(e) = ent {
            if self.pm.touchents.len() < MAXTOUCH {
                self.pm.touchents.push(e);
            }
        }
    }

    fn on_ground(&self) -> bool {
        self.pm.groundentity.is_some()
    }

    /// Moves along the velocity, sliding off anything hit, for up to four
    /// impacts.
    fn slide_move(&mut self) {
        let primal_velocity = self.pml.velocity;
        let mut planes: Vec<Vec3> = Vec::with_capacity(MAX_CLIP_PLANES);
        let mut time_left = self.pml.frametime;

        for _ in 0..4 {
            let end = vector_ma(&self.pml.origin, time_left, &self.pml.velocity);
            let origin = self.pml.origin;
            let trace = self.trace(&origin, &end);

            if trace.allsolid {
                // trapped in another solid
                self.pml.velocity[2] = 0.0;
                return;
            }

            if trace.fraction > 0.0 {
                // covered some distance
                self.pml.origin = trace.endpos;
                planes.clear();
            }

            if trace.fraction == 1.0 {
                break;
            }

            self.touch(trace.ent);
            time_left -= time_left * trace.fraction;

            if planes.len() >= MAX_CLIP_PLANES {
                self.pml.velocity = VEC3_ORIGIN;
                break;
            }
            planes.push(trace.plane.normal);

            // find a velocity that parallels every clip plane
            let mut clipped = None;
            for (i, plane) in planes.iter().enumerate() {
                let v = clip_velocity(&self.pml.velocity, plane, OVERCLIP);
                self.pml.velocity = v;
                let fits = planes
                    .iter()
                    .enumerate()
                    .all(|(j, other)| j == i || dot_product(&v, other) >= 0.0);
                if fits {
                    clipped = Some(i);
                    break;
                }
            }

            if clipped.is_none() {
                // go along the crease
                if planes.len() != 2 {
                    self.pml.velocity = VEC3_ORIGIN;
                    break;
                }
                let dir = cross_product(&planes[0], &planes[1]);
                let d = dot_product(&dir, &self.pml.velocity);
                self.pml.velocity = vector_scale(&dir, d);
            }

            // turned against the original velocity, stop dead to avoid
            // tiny oscillations in corners
            if dot_product(&self.pml.velocity, &primal_velocity) <= 0.0 {
                self.pml.velocity = VEC3_ORIGIN;
                break;
            }
        }

        if self.pm.s.pm_time != 0 {
            self.pml.velocity = primal_velocity;
        }
    }

    /// Slides once at floor height and once lifted by a step, then keeps
    /// whichever went farther horizontally.
    fn step_slide_move(&mut self) {
        let start_o = self.pml.origin;
        let start_v = self.pml.velocity;

        self.slide_move();

        let down_o = self.pml.origin;
        let down_v = self.pml.velocity;

        let mut up = start_o;
        up[2] += STEPSIZE;
        if self.trace(&up, &up).allsolid {
            return; // can't step up
        }

        self.pml.origin = up;
        self.pml.velocity = start_v;
        self.slide_move();

        // push down the final amount
        let lifted = self.pml.origin;
        let mut down = lifted;
        down[2] -= STEPSIZE;
        let trace = self.trace(&lifted, &down);
        if !trace.allsolid {
            self.pml.origin = trace.endpos;
        }

        let up = self.pml.origin;
        let down_dist = (down_o[0] - start_o[0]).powi(2) + (down_o[1] - start_o[1]).powi(2);
        let up_dist = (up[0] - start_o[0]).powi(2) + (up[1] - start_o[1]).powi(2);

        if down_dist > up_dist || trace.plane.normal[2] < MIN_STEP_NORMAL {
            self.pml.origin = down_o;
            self.pml.velocity = down_v;
            return;
        }
        // walking along a plane keeps the lower move's vertical speed
        self.pml.velocity[2] = down_v[2];
    }

    fn friction(&mut self) {
        let vel = &mut self.pml.velocity;
        let speed = vector_length(vel);
        if speed < 1.0 {
            vel[0] = 0.0;
            vel[1] = 0.0;
            return;
        }

        let mut drop = 0.0;

        let slick = self.pml.groundsurface.is_some_and(|s| s.flags & SURF_SLICK != 0);
        if (self.pm.groundentity.is_some() && !slick) || self.pml.ladder {
            let control = speed.max(PM_STOPSPEED);
            drop += control * PM_FRICTION * self.pml.frametime;
        }

        if self.pm.waterlevel != 0 && !self.pml.ladder {
            drop += speed * PM_WATERFRICTION * self.pm.waterlevel as f32 * self.pml.frametime;
        }

        let newspeed = (speed - drop).max(0.0) / speed;
        *vel = vector_scale(vel, newspeed);
    }

    fn accelerate(&mut self, wishdir: &Vec3, wishspeed: f32, accel: f32) {
        let addspeed = wishspeed - dot_product(&self.pml.velocity, wishdir);
        if addspeed <= 0.0 {
            return;
        }
        let accelspeed = (accel * self.pml.frametime * wishspeed).min(addspeed);
        self.pml.velocity = vector_ma(&self.pml.velocity, accelspeed, wishdir);
    }

    fn air_accelerate(&mut self, wishdir: &Vec3, wishspeed: f32, accel: f32) {
        let addspeed = wishspeed.min(30.0) - dot_product(&self.pml.velocity, wishdir);
        if addspeed <= 0.0 {
            return;
        }
        let accelspeed = (accel * wishspeed * self.pml.frametime).min(addspeed);
        self.pml.velocity = vector_ma(&self.pml.velocity, accelspeed, wishdir);
    }

    /// Ladder climbing, water currents and conveyors.
    fn add_currents(&self, wishvel: &mut Vec3) {
        if self.pml.ladder && self.pml.velocity[2].abs() <= 200.0 {
            let pitch = self.pm.viewangles[PITCH];
            let cmd = &self.pm.cmd;
            wishvel[2] = if pitch <= -15.0 && cmd.forwardmove > 0 {
                200.0
            } else if pitch >= 15.0 && cmd.forwardmove > 0 {
                -200.0
            } else if cmd.upmove > 0 {
                200.0
            } else if cmd.upmove < 0 {
                -200.0
            } else {
                0.0
            };

            // limit horizontal speed when on a ladder
            wishvel[0] = wishvel[0].clamp(-25.0, 25.0);
            wishvel[1] = wishvel[1].clamp(-25.0, 25.0);
        }

        if self.pm.watertype & MASK_CURRENT != 0 {
            let mut s = PM_WATERSPEED;
            if self.pm.waterlevel == 1 && self.on_ground() {
                s /= 2.0;
            }
            *wishvel = vector_ma(wishvel, s, &current_direction(self.pm.watertype));
        }

        if self.on_ground() {
            *wishvel = vector_ma(wishvel, 100.0, &current_direction(self.pml.groundcontents));
        }
    }

    fn water_move(&mut self) {
        let cmd = self.pm.cmd;
        let mut wishvel = [0.0f32; 3];
        for i in 0..3 {
            wishvel[i] = self.pml.forward[i] * cmd.forwardmove as f32 + self.pml.right[i] * cmd.sidemove as f32;
        }

        if cmd.forwardmove == 0 && cmd.sidemove == 0 && cmd.upmove == 0 {
            wishvel[2] -= 60.0; // drift towards bottom
        } else {
            wishvel[2] += cmd.upmove as f32;
        }

        self.add_currents(&mut wishvel);

        let mut wishdir = wishvel;
        let wishspeed = vector_normalize(&mut wishdir).min(PM_MAXSPEED) * 0.5;

        self.accelerate(&wishdir, wishspeed, PM_WATERACCELERATE);
        self.step_slide_move();
    }

    fn air_move(&mut self) {
        let cmd = self.pm.cmd;
        let mut wishvel = [0.0f32; 3];
        for i in 0..2 {
            wishvel[i] = self.pml.forward[i] * cmd.forwardmove as f32 + self.pml.right[i] * cmd.sidemove as f32;
        }

        self.add_currents(&mut wishvel);

        let mut wishdir = wishvel;
        let mut wishspeed = vector_normalize(&mut wishdir);

        let maxspeed = if self.pm.s.pm_flags & PMF_DUCKED != 0 { PM_DUCKSPEED } else { PM_MAXSPEED };
        if wishspeed > maxspeed {
            wishvel = vector_scale(&wishvel, maxspeed / wishspeed);
            wishspeed = maxspeed;
        }

        let gravity = self.pm.s.gravity as f32;
        let frametime = self.pml.frametime;

        if self.pml.ladder {
            self.accelerate(&wishdir, wishspeed, PM_ACCELERATE);
            if wishvel[2] == 0.0 {
                // ease vertical speed toward zero
                let vz = &mut self.pml.velocity[2];
                if *vz > 0.0 {
                    *vz = (*vz - gravity * frametime).max(0.0);
                } else {
                    *vz = (*vz + gravity * frametime).min(0.0);
                }
            }
            self.step_slide_move();
        } else if self.on_ground() {
            self.pml.velocity[2] = 0.0;
            self.accelerate(&wishdir, wishspeed, PM_ACCELERATE);

            // negative gravity fields can lift a standing player
            if gravity > 0.0 {
                self.pml.velocity[2] = 0.0;
            } else {
                self.pml.velocity[2] -= gravity * frametime;
            }

            if self.pml.velocity[0] == 0.0 && self.pml.velocity[1] == 0.0 {
                return;
            }
            self.step_slide_move();
        } else {
            if PM_AIRACCELERATE != 0.0 {
                self.air_accelerate(&wishdir, wishspeed, PM_AIRACCELERATE);
            } else {
                self.accelerate(&wishdir, wishspeed, 1.0);
            }
            self.pml.velocity[2] -= gravity * frametime;
            self.step_slide_move();
        }
    }

    /// Sets the ground entity, water type and water level for the current
    /// position.
    fn categorize_position(&mut self) {
        let origin = self.pml.origin;
        let mut point = origin;
        point[2] -= 0.25;

        if self.pml.velocity[2] > 180.0 {
            // moving up too fast to stick
            self.pm.s.pm_flags &= !PMF_ON_GROUND;
            self.pm.groundentity = None;
        } else {
            let trace = self.trace(&origin, &point);
            self.pml.groundplane = trace.plane;
            self.pml.groundsurface = trace.surface;
            self.pml.groundcontents = trace.contents;

            if trace.ent.is_none() || (trace.plane.normal[2] < 0.7 && !trace.startsolid) {
                self.pm.groundentity = None;
                self.pm.s.pm_flags &= !PMF_ON_GROUND;
            } else {
                self.pm.groundentity = trace.ent;

                // solid ground ends a waterjump
                if self.pm.s.pm_flags & PMF_TIME_WATERJUMP != 0 {
                    self.pm.s.pm_flags &= !(PMF_TIME_WATERJUMP | PMF_TIME_LAND | PMF_TIME_TELEPORT);
                    self.pm.s.pm_time = 0;
                }

                if self.pm.s.pm_flags & PMF_ON_GROUND == 0 {
                    // just landed; sliding down a slope gets no landing time
                    self.pm.s.pm_flags |= PMF_ON_GROUND;
                    if self.pml.velocity[2] < -200.0 {
                        self.pm.s.pm_flags |= PMF_TIME_LAND;
                        self.pm.s.pm_time = if self.pml.velocity[2] < -400.0 { 25 } else { 18 };
                    }
                }
            }

            self.touch(trace.ent);
        }

        // water level, accounting for ducking
        self.pm.waterlevel = 0;
        self.pm.watertype = 0;

        let sample2 = (self.pm.viewheight - self.pm.mins[2]) as i32;
        let sample1 = sample2 / 2;
        let base = origin[2] + self.pm.mins[2];

        let mut point = [origin[0], origin[1], base + 1.0];
        let cont = self.world.point_contents(&point);
        if cont & MASK_WATER != 0 {
            self.pm.watertype = cont;
            self.pm.waterlevel = 1;
            point[2] = base + sample1 as f32;
            if self.world.point_contents(&point) & MASK_WATER != 0 {
                self.pm.waterlevel = 2;
                point[2] = base + sample2 as f32;
                if self.world.point_contents(&point) & MASK_WATER != 0 {
                    self.pm.waterlevel = 3;
                }
            }
        }
    }

    fn check_jump(&mut self) {
        if self.pm.s.pm_flags & PMF_TIME_LAND != 0 {
            // hasn't been long enough since landing to jump again
            return;
        }

        if self.pm.cmd.upmove < 10 {
            self.pm.s.pm_flags &= !PMF_JUMP_HELD;
            return;
        }

        // must wait for jump to be released
        if self.pm.s.pm_flags & PMF_JUMP_HELD != 0 || self.pm.s.pm_type == PmType::Dead {
            return;
        }

        if self.pm.waterlevel >= 2 {
            // swimming, not jumping
            self.pm.groundentity = None;
            if self.pml.velocity[2] <= -300.0 {
                return;
            }
            self.pml.velocity[2] = match self.pm.watertype {
                CONTENTS_WATER => 100.0,
                CONTENTS_SLIME => 80.0,
                _ => 50.0,
            };
            return;
        }

        if !self.on_ground() {
            return;
        }

        self.pm.s.pm_flags |= PMF_JUMP_HELD;
        self.pm.groundentity = None;
        self.pml.velocity[2] = (self.pml.velocity[2] + 270.0).max(270.0);
    }

    /// Ladder contact and jumping out of water onto a ledge.
    fn check_special_movement(&mut self) {
        if self.pm.s.pm_time != 0 {
            return;
        }

        self.pml.ladder = false;

        let mut flatforward = [self.pml.forward[0], self.pml.forward[1], 0.0];
        vector_normalize(&mut flatforward);

        let origin = self.pml.origin;
        let spot = vector_add(&origin, &flatforward);
        let trace = self.trace(&origin, &spot);
        if trace.fraction < 1.0 && trace.contents & CONTENTS_LADDER != 0 {
            self.pml.ladder = true;
        }

        if self.pm.waterlevel != 2 {
            return;
        }

        let mut spot = vector_ma(&origin, 30.0, &flatforward);
        spot[2] += 4.0;
        if self.world.point_contents(&spot) & CONTENTS_SOLID == 0 {
            return;
        }
        spot[2] += 16.0;
        if self.world.point_contents(&spot) != 0 {
            return;
        }

        // jump out of water
        self.pml.velocity = vector_scale(&flatforward, 50.0);
        self.pml.velocity[2] = 350.0;
        self.pm.s.pm_flags |= PMF_TIME_WATERJUMP;
        self.pm.s.pm_time = 255;
    }

    fn fly_move(&mut self, doclip: bool) {
        self.pm.viewheight = 22.0;

        let speed = vector_length(&self.pml.velocity);
        if speed < 1.0 {
            self.pml.velocity = VEC3_ORIGIN;
        } else {
            // extra friction
            let drop = speed.max(PM_STOPSPEED) * PM_FRICTION * 1.5 * self.pml.frametime;
            let newspeed = (speed - drop).max(0.0) / speed;
            self.pml.velocity = vector_scale(&self.pml.velocity, newspeed);
        }

        vector_normalize(&mut self.pml.forward);
        vector_normalize(&mut self.pml.right);

        let cmd = self.pm.cmd;
        let mut wishvel = [0.0f32; 3];
        for i in 0..3 {
            wishvel[i] = self.pml.forward[i] * cmd.forwardmove as f32 + self.pml.right[i] * cmd.sidemove as f32;
        }
        wishvel[2] += cmd.upmove as f32;

        let mut wishdir = wishvel;
        let wishspeed = vector_normalize(&mut wishdir).min(PM_MAXSPEED);

        let addspeed = wishspeed - dot_product(&self.pml.velocity, &wishdir);
        if addspeed <= 0.0 {
            return;
        }
        let accelspeed = (PM_ACCELERATE * self.pml.frametime * wishspeed).min(addspeed);
        self.pml.velocity = vector_ma(&self.pml.velocity, accelspeed, &wishdir);

        let end = vector_ma(&self.pml.origin, self.pml.frametime, &self.pml.velocity);
        if doclip {
            let origin = self.pml.origin;
            self.pml.origin = self.trace(&origin, &end).endpos;
        } else {
            self.pml.origin = end;
        }
    }

    /// Sets the bounding box and view height, ducking or standing up.
    fn check_duck(&mut self) {
        self.pm.mins[0] = -16.0;
        self.pm.mins[1] = -16.0;
        self.pm.maxs[0] = 16.0;
        self.pm.maxs[1] = 16.0;

        if self.pm.s.pm_type == PmType::Gib {
            self.pm.mins[2] = 0.0;
            self.pm.maxs[2] = 16.0;
            self.pm.viewheight = 8.0;
            return;
        }

        self.pm.mins[2] = -24.0;

        if self.pm.s.pm_type == PmType::Dead {
            self.pm.s.pm_flags |= PMF_DUCKED;
        } else if self.pm.cmd.upmove < 0 && self.pm.s.pm_flags & PMF_ON_GROUND != 0 {
            self.pm.s.pm_flags |= PMF_DUCKED;
        } else if self.pm.s.pm_flags & PMF_DUCKED != 0 {
            // try to stand up
            self.pm.maxs[2] = 32.0;
            let origin = self.pml.origin;
            if !self.trace(&origin, &origin).allsolid {
                self.pm.s.pm_flags &= !PMF_DUCKED;
            }
        }

        self.set_view_height();
    }

    fn set_view_height(&mut self) {
        if self.pm.s.pm_flags & PMF_DUCKED != 0 {
            self.pm.maxs[2] = 4.0;
            self.pm.viewheight = -2.0;
        } else {
            self.pm.maxs[2] = 32.0;
            self.pm.viewheight = 22.0;
        }
    }

    fn dead_move(&mut self) {
        if !self.on_ground() {
            return;
        }

        // extra friction
        let forward = vector_length(&self.pml.velocity) - 20.0;
        if forward <= 0.0 {
            self.pml.velocity = VEC3_ORIGIN;
        } else {
            vector_normalize(&mut self.pml.velocity);
            self.pml.velocity = vector_scale(&self.pml.velocity, forward);
        }
    }

    fn good_position(&mut self) -> bool {
        if self.pm.s.pm_type == PmType::Spectator {
            return true;
        }
        let origin = fixed_to_float(&self.pm.s.origin);
        !self.trace(&origin, &origin).allsolid
    }

    /// Quantizes origin and velocity to eighths. The origin is nudged
    /// toward the float position on each axis until the box is in a legal
    /// spot, falling back to where the move started.
    fn snap_position(&mut self) {
        for i in 0..3 {
            self.pm.s.velocity[i] = (self.pml.velocity[i] * 8.0) as i16;
        }

        let mut sign = [0i16; 3];
        for i in 0..3 {
            sign[i] = if self.pml.origin[i] >= 0.0 { 1 } else { -1 };
            self.pm.s.origin[i] = (self.pml.origin[i] * 8.0) as i16;
            if self.pm.s.origin[i] as f32 * 0.125 == self.pml.origin[i] {
                sign[i] = 0;
            }
        }
        let base = self.pm.s.origin;

        for bits in JITTERBITS {
            self.pm.s.origin = base;
            for i in 0..3 {
                if bits & (1 << i) != 0 {
                    self.pm.s.origin[i] = self.pm.s.origin[i].wrapping_add(sign[i]);
                }
            }
            if self.good_position() {
                return;
            }
        }

        self.pm.s.origin = self.pml.previous_origin;
    }

    /// Searches the 27 neighbouring eighths for a legal starting spot.
    fn initial_snap_position(&mut self) {
        const OFFSET: [i16; 3] = [0, -1, 1];
        let base = self.pm.s.origin;

        for dz in OFFSET {
            for dy in OFFSET {
                for dx in OFFSET {
                    self.pm.s.origin = [
                        base[0].wrapping_add(dx),
                        base[1].wrapping_add(dy),
                        base[2].wrapping_add(dz),
                    ];
                    if self.good_position() {
                        self.pml.origin = fixed_to_float(&self.pm.s.origin);
                        self.pml.previous_origin = self.pm.s.origin;
                        return;
                    }
                }
            }
        }

        self.pm.s.origin = base;
        debug!("Bad InitialSnapPosition");
    }

    fn clamp_angles(&mut self) {
        let cmd_angles = self.pm.cmd.angles;
        let delta = self.pm.s.delta_angles;

        if self.pm.s.pm_flags & PMF_TIME_TELEPORT != 0 {
            self.pm.viewangles[YAW] = short2angle(cmd_angles[YAW].wrapping_add(delta[YAW]));
            self.pm.viewangles[PITCH] = 0.0;
            self.pm.viewangles[ROLL] = 0.0;
        } else {
            // circularly clamp the angles with deltas
            for i in 0..3 {
                self.pm.viewangles[i] = short2angle(cmd_angles[i].wrapping_add(delta[i]));
            }

            // no looking up or down past vertical
            let pitch = &mut self.pm.viewangles[PITCH];
            if *pitch > 89.0 && *pitch < 180.0 {
                *pitch = 89.0;
            } else if *pitch < 271.0 && *pitch >= 180.0 {
                *pitch = 271.0;
            }
        }

        let (forward, right, up) = angle_vectors(&self.pm.viewangles);
        self.pml.forward = forward;
        self.pml.right = right;
        self.pml.up = up;
    }

    /// Counts down the timed states by the command's duration in 8 ms units.
    fn drop_timers(&mut self) {
        if self.pm.s.pm_time == 0 {
            return;
        }
        let msec = (self.pm.cmd.msec >> 3).max(1);
        if msec >= self.pm.s.pm_time {
            self.pm.s.pm_flags &= !(PMF_TIME_WATERJUMP | PMF_TIME_LAND | PMF_TIME_TELEPORT);
            self.pm.s.pm_time = 0;
        } else {
            self.pm.s.pm_time -= msec;
        }
    }

    fn run(&mut self) {
        self.pm.touchents.clear();
        self.pm.viewangles = VEC3_ORIGIN;
        self.pm.viewheight = 0.0;
        self.pm.groundentity = None;
        self.pm.watertype = 0;
        self.pm.waterlevel = 0;

        self.pml = Scratch {
            origin: fixed_to_float(&self.pm.s.origin),
            velocity: fixed_to_float(&self.pm.s.velocity),
            // save old org in case we get stuck
            previous_origin: self.pm.s.origin,
            frametime: self.pm.cmd.msec as f32 * 0.001,
            ..Scratch::default()
        };

        self.clamp_angles();

        if self.pm.s.pm_type == PmType::Spectator {
            self.fly_move(false);
            self.snap_position();
            return;
        }

        if self.pm.s.pm_type >= PmType::Dead {
            self.pm.cmd.forwardmove = 0;
            self.pm.cmd.sidemove = 0;
            self.pm.cmd.upmove = 0;
        }

        if self.pm.s.pm_type == PmType::Freeze {
            // no movement at all, but demo playback still wants a view height
            self.pm.mins = [-16.0, -16.0, -24.0];
            self.pm.maxs[0] = 16.0;
            self.pm.maxs[1] = 16.0;
            self.set_view_height();
            return;
        }

        self.check_duck();

        if self.pm.snapinitial {
            self.initial_snap_position();
        }

        self.categorize_position();

        if self.pm.s.pm_type == PmType::Dead {
            self.dead_move();
        }

        self.check_special_movement();
        self.drop_timers();

        if self.pm.s.pm_flags & PMF_TIME_TELEPORT != 0 {
            // teleport pause stays exactly in place
        } else if self.pm.s.pm_flags & PMF_TIME_WATERJUMP != 0 {
            // waterjump has no control, but falls
            self.pml.velocity[2] -= self.pm.s.gravity as f32 * self.pml.frametime;
            if self.pml.velocity[2] < 0.0 {
                // cancel as soon as we are falling down again
                self.pm.s.pm_flags &= !(PMF_TIME_WATERJUMP | PMF_TIME_LAND | PMF_TIME_TELEPORT);
                self.pm.s.pm_time = 0;
            }
            self.step_slide_move();
        } else {
            self.check_jump();
            self.friction();

            if self.pm.waterlevel >= 2 {
                self.water_move();
            } else {
                // walking direction ignores most of the view pitch
                let mut angles = self.pm.viewangles;
                if angles[PITCH] > 180.0 {
                    angles[PITCH] -= 360.0;
                }
                angles[PITCH] /= 3.0;
                let (forward, right, up) = angle_vectors(&angles);
                self.pml.forward = forward;
                self.pml.right = right;
                self.pml.up = up;

                self.air_move();
            }
        }

        // ground and water for the final spot
        self.categorize_position();
        self.snap_position();
    }
}

fn current_direction(contents: i32) -> Vec3 {
    let mut v = [0.0f32; 3];
    if contents & CONTENTS_CURRENT_0 != 0 {
        v[0] += 1.0;
    }
    if contents & CONTENTS_CURRENT_90 != 0 {
        v[1] += 1.0;
    }
    if contents & CONTENTS_CURRENT_180 != 0 {
        v[0] -= 1.0;
    }
    if contents & CONTENTS_CURRENT_270 != 0 {
        v[1] -= 1.0;
    }
    if contents & CONTENTS_CURRENT_UP != 0 {
        v[2] += 1.0;
    }
    if contents & CONTENTS_CURRENT_DOWN != 0 {
        v[2] -= 1.0;
    }
    v
}

/// Runs one movement command against `pm.s`, filling in the outputs of
/// `pm`. Deterministic for a given state, command and world.
pub fn pmove<C: PmoveCallbacks + ?Sized>(pm: &mut PmoveData, world: &mut C) {
    let mut mover = PlayerMove { pm, pml: Scratch::default(), world };
    mover.run();
}

#[cfg(test)]
mod tests {
    use super::*;

    /// An endless floor at `floor` plus optional water filling everything.
    struct Floor {
        floor: f32,
        water: bool,
        traces: usize,
    }

    impl Floor {
        fn new(floor: f32) -> Self {
            Self { floor, water: false, traces: 0 }
        }
    }

    impl PmoveCallbacks for Floor {
        fn trace(&mut self, start: &Vec3, mins: &Vec3, _maxs: &Vec3, end: &Vec3) -> Trace {
            self.traces += 1;
            let mut tr = Trace::default();
            let sb = start[2] + mins[2] - self.floor;
            let eb = end[2] + mins[2] - self.floor;
            let up = CPlane { normal: [0.0, 0.0, 1.0], dist: self.floor, plane_type: PLANE_Z, signbits: 0 };
            if sb < 0.0 {
                tr.startsolid = true;
                tr.allsolid = eb < 0.0;
                tr.fraction = 0.0;
                tr.endpos = *start;
                tr.plane = up;
                tr.ent = Some(0);
                return tr;
            }
            if eb >= 0.0 {
                tr.endpos = *end;
                return tr;
            }
            tr.fraction = sb / (sb - eb);
            for i in 0..3 {
                tr.endpos[i] = start[i] + tr.fraction * (end[i] - start[i]);
            }
            tr.plane = up;
            tr.ent = Some(0);
            tr
        }

        fn point_contents(&mut self, _point: &Vec3) -> i32 {
            if self.water {
                CONTENTS_WATER
            } else {
                0
            }
        }
    }

    /// Every position is inside solid.
    struct Solid;

    impl PmoveCallbacks for Solid {
        fn trace(&mut self, start: &Vec3, _mins: &Vec3, _maxs: &Vec3, _end: &Vec3) -> Trace {
            Trace {
                allsolid: true,
                startsolid: true,
                fraction: 0.0,
                endpos: *start,
                ent: Some(0),
                ..Trace::default()
            }
        }

        fn point_contents(&mut self, _point: &Vec3) -> i32 {
            CONTENTS_SOLID
        }
    }

    fn standing() -> PmoveData {
        let mut pm = PmoveData::default();
        pm.s.origin = [0, 0, 24 * 8];
        pm.s.gravity = 800;
        pm.s.pm_flags = PMF_ON_GROUND;
        pm.cmd.msec = 100;
        pm
    }

    #[test]
    fn walking_forward_accelerates_to_max_speed() {
        let mut pm = standing();
        pm.cmd.forwardmove = 400;
        pmove(&mut pm, &mut Floor::new(0.0));

        assert_eq!(pm.s.velocity, [2400, 0, 0]);
        assert_eq!(pm.s.origin, [240, 0, 192]);
        assert_eq!(pm.groundentity, Some(0));
        assert!(pm.s.pm_flags & PMF_ON_GROUND != 0);
        assert_eq!(pm.viewheight, 22.0);
        assert_eq!(pm.maxs[2], 32.0);
    }

    #[test]
    fn standing_still_stays_put() {
        let mut pm = standing();
        pmove(&mut pm, &mut Floor::new(0.0));
        assert_eq!(pm.s.origin, [0, 0, 192]);
        assert_eq!(pm.s.velocity, [0, 0, 0]);
    }

    #[test]
    fn jump_leaves_ground() {
        let mut pm = standing();
        pm.cmd.upmove = 200;
        pmove(&mut pm, &mut Floor::new(0.0));

        assert!(pm.s.pm_flags & PMF_JUMP_HELD != 0);
        assert!(pm.s.pm_flags & PMF_ON_GROUND == 0);
        assert_eq!(pm.groundentity, None);
        // 270 up, minus one tenth of a second of gravity
        assert_eq!(pm.s.velocity[2], 190 * 8);
        assert_eq!(pm.s.origin[2], 43 * 8);
    }

    #[test]
    fn held_jump_does_not_repeat() {
        let mut pm = standing();
        pm.s.pm_flags |= PMF_JUMP_HELD;
        pm.cmd.upmove = 200;
        pmove(&mut pm, &mut Floor::new(0.0));
        assert_eq!(pm.s.velocity[2], 0);
        assert_eq!(pm.groundentity, Some(0));
    }

    #[test]
    fn falling_applies_gravity() {
        let mut pm = standing();
        pm.s.pm_flags = 0;
        pm.s.origin = [0, 0, 100 * 8];
        pmove(&mut pm, &mut Floor::new(0.0));
        assert_eq!(pm.s.velocity[2], -80 * 8);
        assert_eq!(pm.s.origin[2], 92 * 8);
        assert_eq!(pm.groundentity, None);
    }

    #[test]
    fn hard_landing_sets_land_timer() {
        let mut pm = standing();
        pm.s.pm_flags = 0;
        // an eighth above the floor, still falling fast
        pm.s.origin = [0, 0, 24 * 8 + 1];
        pm.s.velocity = [0, 0, -500 * 8];
        pmove(&mut pm, &mut Floor::new(0.0));
        assert!(pm.s.pm_flags & PMF_ON_GROUND != 0);
        assert!(pm.s.pm_flags & PMF_TIME_LAND != 0);
        // 25 ticks minus the 12 this command lasted
        assert_eq!(pm.s.pm_time, 13);
        assert_eq!(pm.s.origin, [0, 0, 24 * 8 + 1]);
        assert_eq!(pm.s.velocity, [0, 0, 0]);
    }

    #[test]
    fn crouching_shrinks_the_box() {
        let mut pm = standing();
        pm.cmd.upmove = -100;
        pmove(&mut pm, &mut Floor::new(0.0));
        assert!(pm.s.pm_flags & PMF_DUCKED != 0);
        assert_eq!(pm.maxs[2], 4.0);
        assert_eq!(pm.viewheight, -2.0);
    }

    #[test]
    fn identical_inputs_give_identical_outputs() {
        let mut a = standing();
        a.cmd.forwardmove = 400;
        a.cmd.sidemove = -200;
        a.cmd.angles = [0, angle2short(37.0), 0];
        a.cmd.msec = 16;
        let mut b = a.clone();

        for _ in 0..20 {
            pmove(&mut a, &mut Floor::new(0.0));
            pmove(&mut b, &mut Floor::new(0.0));
        }
        assert_eq!(a.s, b.s);
        assert_eq!(a.viewangles, b.viewangles);
    }

    #[test]
    fn no_state_carries_between_calls() {
        let cmd = UserCmd { msec: 50, forwardmove: 300, ..UserCmd::default() };

        // the same mover handles an unrelated jump first
        let mut world = Floor::new(0.0);
        let mut warmup = standing();
        warmup.cmd.upmove = 400;
        pmove(&mut warmup, &mut world);

        let mut used = standing();
        used.cmd = cmd;
        let mut fresh = used.clone();
        pmove(&mut used, &mut world);
        pmove(&mut fresh, &mut Floor::new(0.0));
        assert_eq!(used.s, fresh.s);
        assert_eq!(used.touchents, fresh.touchents);
    }

    /// Runs only the end-of-move snap for a float origin.
    fn snap<C: PmoveCallbacks>(pm: &mut PmoveData, world: &mut C, origin: Vec3, previous: [i16; 3]) {
        pm.mins = [-16.0, -16.0, -24.0];
        pm.maxs = [16.0, 16.0, 32.0];
        let mut mover =
            PlayerMove { pm, pml: Scratch { origin, previous_origin: previous, ..Scratch::default() }, world };
        mover.snap_position();
    }

    #[test]
    fn snapping_moves_each_axis_at_most_an_eighth_and_is_stable() {
        let mut world = Floor::new(-10000.0);
        let mut pm = PmoveData::default();
        for i in 0..200 {
            let f = i as f32;
            let origin = [f * 3.37 - 301.9, 97.13 - f * 1.91, f * 0.613 - 40.07];
            snap(&mut pm, &mut world, origin, [0; 3]);
            let snapped = fixed_to_float(&pm.s.origin);
            for axis in 0..3 {
                assert!((snapped[axis] - origin[axis]).abs() <= 0.125, "{:?} -> {:?}", origin, snapped);
            }

            let first = pm.s.origin;
            snap(&mut pm, &mut world, snapped, [0; 3]);
            assert_eq!(pm.s.origin, first);
        }
    }

    #[test]
    fn snapping_nudges_out_of_the_floor_by_one_eighth() {
        let mut pm = PmoveData::default();
        // truncating z puts the box an eighth into the floor, rounding it
        // up instead is legal
        snap(&mut pm, &mut Floor::new(0.0), [10.3, -3.3, 23.95], [0, 0, 400]);
        assert_eq!(pm.s.origin, [82, -26, 192]);
    }

    #[test]
    fn embedded_player_snaps_back_to_previous_origin() {
        let mut pm = standing();
        pm.s.origin = [11, -13, 17];
        pm.s.velocity = [800, 0, 0];
        pm.cmd.forwardmove = 400;
        pmove(&mut pm, &mut Solid);
        assert_eq!(pm.s.origin, [11, -13, 17]);
    }

    #[test]
    fn spectator_flies_through_solid() {
        let mut pm = standing();
        pm.s.pm_type = PmType::Spectator;
        pm.cmd.forwardmove = 400;
        pmove(&mut pm, &mut Solid);
        assert!(pm.s.origin[0] > 0);
        assert_eq!(pm.viewheight, 22.0);
    }

    #[test]
    fn freeze_does_not_move_but_sets_view_height() {
        let mut pm = standing();
        pm.s.pm_type = PmType::Freeze;
        pm.s.velocity = [800, 0, 0];
        pm.cmd.forwardmove = 400;
        let mut world = Floor::new(0.0);
        pmove(&mut pm, &mut world);
        assert_eq!(pm.s.origin, [0, 0, 192]);
        assert_eq!(pm.viewheight, 22.0);
        assert_eq!(world.traces, 0);
    }

    #[test]
    fn dead_player_ignores_intent() {
        let mut pm = standing();
        pm.s.pm_type = PmType::Dead;
        pm.cmd.forwardmove = 400;
        pmove(&mut pm, &mut Floor::new(0.0));
        assert_eq!(pm.s.velocity[0], 0);
        assert!(pm.s.pm_flags & PMF_DUCKED != 0);
    }

    #[test]
    fn teleport_pause_holds_position() {
        let mut pm = standing();
        pm.s.pm_flags |= PMF_TIME_TELEPORT;
        pm.s.pm_time = 100;
        pm.cmd.forwardmove = 400;
        pmove(&mut pm, &mut Floor::new(0.0));
        assert_eq!(pm.s.origin, [0, 0, 192]);
        // 100 ms is 12 ticks of 8 ms
        assert_eq!(pm.s.pm_time, 88);
    }

    #[test]
    fn submerged_player_reports_water_level() {
        let mut pm = standing();
        pm.s.pm_flags = 0;
        pm.s.origin = [0, 0, 200 * 8];
        let mut world = Floor::new(0.0);
        world.water = true;
        pmove(&mut pm, &mut world);
        assert_eq!(pm.waterlevel, 3);
        assert_eq!(pm.watertype, CONTENTS_WATER);
        // idle swimmers sink slowly rather than fall
        assert!(pm.s.velocity[2] < 0 && pm.s.velocity[2] > -80 * 8);
    }

    #[test]
    fn pitch_is_clamped() {
        let mut pm = standing();
        pm.cmd.angles = [angle2short(120.0), 0, 0];
        pmove(&mut pm, &mut Floor::new(0.0));
        assert_eq!(pm.viewangles[PITCH], 89.0);
    }

    #[test]
    fn touches_are_recorded() {
        let mut pm = standing();
        pmove(&mut pm, &mut Floor::new(0.0));
        assert!(pm.touchents.contains(&0));
        assert!(pm.touchents.len() <= MAXTOUCH);
    }
}
