//! Reward computation.
//!
//! Both variants measure end-effector error relative to the body's own
//! center of mass: the skeleton is temporarily posed on the target, the
//! difference is taken with the whole-body CoM drift subtracted, and the
//! actual pose is restored before returning.
use super::GaitEnv;
use crate::dynamics::{ArticulatedBody, MotionClip, PhysicsBackend};
use nalgebra::{storage::Storage, DVector, Dim, Vector4};

/// Maps a squared tracking error to `(0, 1]`: 1 at zero error, decaying with
/// the weight.
pub(crate) fn exp_of_squared<R, S>(v: &nalgebra::Vector<f64, R, S>, w: f64) -> f64
where
    R: Dim,
    S: Storage<f64, R>,
{
    (-w * v.norm_squared()).exp()
}

impl<B: PhysicsBackend> GaitEnv<B> {
    /// Reward of the pose-tracking policy.
    ///
    /// `r_ee · (w_q·r_q + w_v·r_v)`, where the pose and velocity differences
    /// are filtered by joint kind over the clip-mapped joints and the
    /// end-effector term is CoM-drift corrected. The whole-body CoM term is
    /// evaluated but carries no weight in the composite.
    pub fn reward(&mut self) -> f64 {
        let weights = self.meta.reward_weights;
        let n = self.character.body().num_dofs();

        let cur_pos = self.character.body().positions();
        let cur_vel = self.character.body().velocities();

        let (p_diff, v_diff) = {
            let body = self.character.body();
            let p_diff_all = body.position_differences(&self.target_positions, &cur_pos);
            let v_diff_all = body.position_differences(&self.target_velocities, &cur_vel);

            let mut p_diff = DVector::zeros(n);
            let mut v_diff = DVector::zeros(n);
            for &link in self.character.clip().mapped_links() {
                let idx = body.joint_dof_offset(link);
                let span = body.joint_kind(link).tracked_dof_count();
                for k in 0..span {
                    p_diff[idx + k] = p_diff_all[idx + k];
                    v_diff[idx + k] = v_diff_all[idx + k];
                }
            }
            (p_diff, v_diff)
        };

        let ees: Vec<usize> = self.character.body().end_effector_links().to_vec();
        let mut ee_diff = DVector::zeros(ees.len() * 3);
        {
            let body = self.character.body();
            for (i, &e) in ees.iter().enumerate() {
                ee_diff
                    .fixed_rows_mut::<3>(3 * i)
                    .copy_from(&body.link_com(e));
            }
        }
        let mut com_diff = self.character.body().com();

        {
            let body = self.character.body_mut();
            body.set_positions(&self.target_positions);
            body.refresh_kinematics();
        }
        {
            let body = self.character.body();
            com_diff -= body.com();
            for (i, &e) in ees.iter().enumerate() {
                let target = body.link_com(e) + com_diff;
                for k in 0..3 {
                    ee_diff[3 * i + k] -= target[k];
                }
            }
        }
        {
            let body = self.character.body_mut();
            body.set_positions(&cur_pos);
            body.refresh_kinematics();
        }

        let r_q = exp_of_squared(&p_diff, 2.0);
        let r_v = exp_of_squared(&v_diff, 0.1);
        let r_ee = exp_of_squared(&ee_diff, 40.0);
        let _r_com = exp_of_squared(&com_diff, 10.0);

        r_ee * (weights.w_q * r_q + weights.w_v * r_v)
    }

    /// Reward of the assistive-torque policy.
    ///
    /// Tracks only the hip and knee angles (l-hip, l-knee, r-hip, r-knee
    /// order) and the two foot centers of mass; `r_q + 0.25·r_v + r_ee`,
    /// unbounded above 1.
    pub fn gait_reward(&mut self) -> f64 {
        let legs = self.legs;

        let (p_diff, v_diff) = {
            let body = self.character.body();
            let l_hip = body.joint_dof_offset(legs.femur_l);
            let r_hip = body.joint_dof_offset(legs.femur_r);
            let l_knee = body.joint_dof_offset(legs.tibia_l);
            let r_knee = body.joint_dof_offset(legs.tibia_r);

            let act = Vector4::new(
                body.joint_positions(legs.femur_l)[0],
                body.joint_positions(legs.tibia_l)[0],
                body.joint_positions(legs.femur_r)[0],
                body.joint_positions(legs.tibia_r)[0],
            );
            let act_v = Vector4::new(
                body.joint_velocities(legs.femur_l)[0],
                body.joint_velocities(legs.tibia_l)[0],
                body.joint_velocities(legs.femur_r)[0],
                body.joint_velocities(legs.tibia_r)[0],
            );
            let reference = Vector4::new(
                self.target_positions[l_hip],
                self.target_positions[l_knee],
                self.target_positions[r_hip],
                self.target_positions[r_knee],
            );
            let reference_v = Vector4::new(
                self.target_velocities[l_hip],
                self.target_velocities[l_knee],
                self.target_velocities[r_hip],
                self.target_velocities[r_knee],
            );
            (reference - act, reference_v - act_v)
        };

        let cur_pos = self.character.body().positions();
        let mut com_diff = self.character.body().com();
        let l_foot = self.character.body().link_com(legs.talus_l);
        let r_foot = self.character.body().link_com(legs.talus_r);

        {
            let body = self.character.body_mut();
            body.set_positions(&self.target_positions);
            body.refresh_kinematics();
        }
        let (l_foot_diff, r_foot_diff) = {
            let body = self.character.body();
            com_diff -= body.com();
            (
                body.link_com(legs.talus_l) - l_foot + com_diff,
                body.link_com(legs.talus_r) - r_foot + com_diff,
            )
        };
        {
            let body = self.character.body_mut();
            body.set_positions(&cur_pos);
            body.refresh_kinematics();
        }

        let mut ee_diff = DVector::zeros(6);
        ee_diff.fixed_rows_mut::<3>(0).copy_from(&l_foot_diff);
        ee_diff.fixed_rows_mut::<3>(3).copy_from(&r_foot_diff);

        let r_q = exp_of_squared(&p_diff, 2.0);
        let r_v = exp_of_squared(&v_diff, 0.1);
        let r_ee = exp_of_squared(&ee_diff, 20.0);

        r_q + 0.25 * r_v + r_ee
    }

    /// Actual hip and knee angles in (l-hip, l-knee, r-hip, r-knee) order.
    pub fn leg_joint_angles(&self) -> Vector4<f64> {
        let body = self.character.body();
        let legs = self.legs;
        Vector4::new(
            body.joint_positions(legs.femur_l)[0],
            body.joint_positions(legs.tibia_l)[0],
            body.joint_positions(legs.femur_r)[0],
            body.joint_positions(legs.tibia_r)[0],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::exp_of_squared;
    use nalgebra::{DVector, Vector3};

    #[test]
    fn unit_at_zero_error() {
        assert_eq!(exp_of_squared(&DVector::<f64>::zeros(12), 2.0), 1.0);
        assert_eq!(exp_of_squared(&Vector3::<f64>::zeros(), 40.0), 1.0);
    }

    #[test]
    fn bounded_and_decaying() {
        let small = exp_of_squared(&Vector3::new(0.1, 0.0, 0.0), 2.0);
        let large = exp_of_squared(&Vector3::new(1.0, 0.0, 0.0), 2.0);
        assert!(small > large);
        assert!(large > 0.0);
        assert!(small < 1.0);
    }

    #[test]
    fn weight_sharpens_the_falloff() {
        let v = Vector3::new(0.5, 0.0, 0.0);
        assert!(exp_of_squared(&v, 40.0) < exp_of_squared(&v, 2.0));
    }
}
