// renderer/batches.rs (sort & group policy)
use super::batch::{Submission2D, Submission3D};
use super::material::Shader;
use crate::asset::{Handle, Resources};

/// Draw-order importance of `shader`; unresolvable shaders sort last.
fn shader_order(resources: &Resources, shader: Handle<Shader>) -> u32 {
    resources
        .shaders
        .get(shader)
        .map_or(u32::MAX, |s| s.order)
}

/// Orders 2D submissions by shader importance, then screen depth.
///
/// Importance ordering is what keeps blended layers correct. The shader handle
/// breaks remaining ties so equal-importance shaders at equal depth form one
/// run. The sort is stable, so fully equal keys keep submission order.
pub(crate) fn sort_2d(entries: &mut [Submission2D], resources: &Resources) {
    entries.sort_by(|a, b| {
        shader_order(resources, a.shader)
            .cmp(&shader_order(resources, b.shader))
            .then_with(|| a.depth().total_cmp(&b.depth()))
            .then_with(|| a.shader.cmp(&b.shader))
    });
}

/// Orders 3D submissions by shader importance, then geometry id, so identical
/// meshes end up adjacent inside a shader run.
pub(crate) fn sort_3d(entries: &mut [Submission3D], resources: &Resources) {
    entries.sort_by(|a, b| {
        shader_order(resources, a.shader)
            .cmp(&shader_order(resources, b.shader))
            .then_with(|| a.geometry.id.cmp(&b.geometry.id))
            .then_with(|| a.shader.cmp(&b.shader))
    });
}

/// Lengths of the maximal same-shader runs of an already sorted slice.
pub(crate) fn shader_runs<T>(entries: &[T], shader_of: impl Fn(&T) -> Handle<Shader>) -> Vec<usize> {
    let mut runs: Vec<(Handle<Shader>, usize)> = Vec::new();
    for entry in entries {
        let shader = shader_of(entry);
        match runs.last_mut() {
            Some((active, count)) if *active == shader => *count += 1,
            _ => runs.push((shader, 1)),
        }
    }
    runs.into_iter().map(|(_, count)| count).collect()
}
