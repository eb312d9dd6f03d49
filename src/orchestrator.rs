//! Per-frame cycle: latest detection -> landmarks -> occluder + placement ->
//! smoothing -> scene -> renderer.
//!
//! The orchestrator is the only consumer of detector events and the only
//! owner of smoothing state. Rendering and detection run at independent
//! rates; a tick without a new detection re-renders the current scene.

use std::time::Instant;

use crossbeam_channel::{Receiver, TryRecvError};

use crate::assets::{AssetLoader, default_placement, load_or_placeholder};
use crate::catalog::{AccessoryCategory, AccessoryDescriptor};
use crate::config::Config;
use crate::coords::CameraRig;
use crate::error::Result;
use crate::landmarks::{FrameLandmarks, LandmarkAdapter, RawDetection};
use crate::occlusion::OcclusionMeshBuilder;
use crate::scene::{
    ACCESSORY_RENDER_ORDER, Geometry, MaterialKind, MeshHandle, NodeId, OCCLUDER_RENDER_ORDER,
    Renderer, Scene, Transform,
};
use crate::simulate::SimulatedMotion;
use crate::smoothing::SmoothingState;
use crate::status::{Status, StatusChannel};
use crate::types::Placement;

/// One detector result, already decoded from the backend's wire format.
#[derive(Clone, Debug)]
pub struct DetectedFrame {
    pub detection: RawDetection,
    pub frame_width: u32,
    pub frame_height: u32,
    pub timestamp: Instant,
}

#[derive(Clone, Debug)]
pub enum DetectorEvent {
    Ready,
    Detection(DetectedFrame),
    Failed(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Tracking,
    Simulated,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickOutcome {
    pub new_detection: bool,
    /// The detector side hung up; no further events will arrive.
    pub detector_closed: bool,
}

struct ActiveAccessory {
    descriptor: AccessoryDescriptor,
    mesh: MeshHandle,
    nodes: Vec<NodeId>,
    placeholder: bool,
}

struct Occluder {
    mesh: MeshHandle,
    node: NodeId,
}

pub struct FrameOrchestrator {
    events: Receiver<DetectorEvent>,
    camera: CameraRig,
    adapter: LandmarkAdapter,
    occlusion: Option<OcclusionMeshBuilder>,
    occluder: Option<Occluder>,
    smoothing: SmoothingState,
    scene: Scene,
    active: Option<ActiveAccessory>,
    loader: Box<dyn AssetLoader>,
    status: StatusChannel,
    mode: Mode,
    motion: SimulatedMotion,
    simulated_ticks: u64,
    detector_closed: bool,
}

impl FrameOrchestrator {
    pub fn new(
        config: &Config,
        events: Receiver<DetectorEvent>,
        loader: Box<dyn AssetLoader>,
        status: StatusChannel,
    ) -> Self {
        let occlusion = config
            .occlusion
            .enabled
            .then(|| OcclusionMeshBuilder::new(&config.occlusion));
        let mut orchestrator = Self {
            events,
            camera: CameraRig::from_config(&config.camera),
            adapter: LandmarkAdapter::new(
                config.camera.width,
                config.camera.height,
                config.tracking.min_pose_visibility,
            ),
            occlusion,
            occluder: None,
            smoothing: SmoothingState::new(config.smoothing, config.tracking.max_lost_frames),
            scene: Scene::new(),
            active: None,
            loader,
            status,
            mode: Mode::Tracking,
            motion: SimulatedMotion::default(),
            simulated_ticks: 0,
            detector_closed: false,
        };
        orchestrator.status.publish(Status::Starting);
        orchestrator
    }

    /// Replace the occlusion builder, e.g. to supply a prepared topology.
    pub fn with_occlusion(mut self, builder: OcclusionMeshBuilder) -> Self {
        self.occlusion = Some(builder);
        self
    }

    pub fn with_motion(mut self, motion: SimulatedMotion) -> Self {
        self.motion = motion;
        self
    }

    pub fn camera(&self) -> &CameraRig {
        &self.camera
    }

    /// Swap the virtual camera, e.g. after the output viewport changed shape.
    pub fn set_camera(&mut self, camera: CameraRig) {
        self.camera = camera;
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn smoothing(&self) -> &SmoothingState {
        &self.smoothing
    }

    pub fn active_accessory(&self) -> Option<&AccessoryDescriptor> {
        self.active.as_ref().map(|active| &active.descriptor)
    }

    pub fn is_placeholder(&self) -> bool {
        self.active.as_ref().is_some_and(|active| active.placeholder)
    }

    pub fn status(&self) -> Option<&Status> {
        self.status.current()
    }

    pub fn occluder_mesh(&self) -> Option<MeshHandle> {
        self.occluder.as_ref().map(|occluder| occluder.mesh)
    }

    /// Switch to deterministic motion, e.g. after the detector failed to start.
    pub fn enter_simulated(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        if self.mode != Mode::Simulated {
            log::warn!("switching to simulated motion: {reason}");
        }
        self.mode = Mode::Simulated;
        self.smoothing.clear_all();
        self.status.publish(Status::Simulated(reason));
    }

    /// Swap the active accessory.
    ///
    /// The old nodes leave the scene and their meshes are disposed before the
    /// replacement is created, so no render ever sees a disposed handle.
    pub fn select_accessory<R: Renderer + ?Sized>(
        &mut self,
        descriptor: &AccessoryDescriptor,
        renderer: &mut R,
    ) -> Result<()> {
        self.release_active(renderer)?;
        self.smoothing.clear_all();

        self.status
            .publish(Status::LoadingAccessory(descriptor.name.clone()));
        let loaded = load_or_placeholder(self.loader.as_ref(), descriptor);
        let mesh = renderer.create_mesh(loaded.geometry)?;

        let material = MaterialKind::Shaded {
            color: accessory_color(descriptor.category),
        };
        let rest = default_placement(descriptor.category);
        let nodes = (0..descriptor.instance_count)
            .map(|instance| {
                let id = self.scene.add_node(
                    format!("{}#{instance}", descriptor.id),
                    mesh,
                    material,
                    ACCESSORY_RENDER_ORDER,
                );
                if loaded.placeholder {
                    if let (Some(node), Some(transform)) = (
                        self.scene.node_mut(id),
                        Transform::from_placement(&rest, instance),
                    ) {
                        node.transform = transform;
                        node.visible = true;
                    }
                }
                id
            })
            .collect();

        log::info!(
            "selected {} ({}, {} instance(s){})",
            descriptor.id,
            descriptor.category,
            descriptor.instance_count,
            if loaded.placeholder { ", placeholder" } else { "" }
        );
        self.active = Some(ActiveAccessory {
            descriptor: descriptor.clone(),
            mesh,
            nodes,
            placeholder: loaded.placeholder,
        });
        Ok(())
    }

    /// Run one frame: consume pending detector events, update the scene and render it.
    pub fn tick<R: Renderer + ?Sized>(&mut self, renderer: &mut R) -> Result<TickOutcome> {
        let mut outcome = TickOutcome::default();
        let mut latest = None;
        loop {
            match self.events.try_recv() {
                Ok(DetectorEvent::Ready) => log::info!("detector ready"),
                Ok(DetectorEvent::Detection(frame)) => latest = Some(frame),
                Ok(DetectorEvent::Failed(reason)) => {
                    log::error!("detector failed: {reason}");
                    self.enter_simulated(reason);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if !self.detector_closed {
                        log::info!("detector channel closed");
                    }
                    self.detector_closed = true;
                    break;
                }
            }
        }
        outcome.detector_closed = self.detector_closed;

        match self.mode {
            Mode::Simulated => self.advance_simulation(),
            Mode::Tracking => {
                if let Some(frame) = latest {
                    outcome.new_detection = true;
                    self.apply_detection(&frame, renderer)?;
                }
            }
        }

        renderer.render(&self.scene, &self.camera)?;
        Ok(outcome)
    }

    /// Dispose every mesh this orchestrator created.
    pub fn shutdown<R: Renderer + ?Sized>(&mut self, renderer: &mut R) -> Result<()> {
        self.release_active(renderer)?;
        if let Some(occluder) = self.occluder.take() {
            self.scene.remove_node(occluder.node);
            renderer.dispose_mesh(occluder.mesh)?;
        }
        self.smoothing.clear_all();
        self.status.publish(Status::Stopped);
        Ok(())
    }

    fn release_active<R: Renderer + ?Sized>(&mut self, renderer: &mut R) -> Result<()> {
        let Some(active) = self.active.take() else {
            return Ok(());
        };
        for node in &active.nodes {
            self.scene.remove_node(*node);
        }
        renderer.dispose_mesh(active.mesh)?;
        log::debug!("released {}", active.descriptor.id);
        Ok(())
    }

    fn advance_simulation(&mut self) {
        self.simulated_ticks += 1;
        let Some(category) = self.active.as_ref().map(|a| a.descriptor.category) else {
            return;
        };
        let placement = self.motion.placement(category, self.simulated_ticks);
        self.apply_placement(&placement);
    }

    fn apply_detection<R: Renderer + ?Sized>(
        &mut self,
        frame: &DetectedFrame,
        renderer: &mut R,
    ) -> Result<()> {
        if self.adapter.frame_size() != (frame.frame_width, frame.frame_height) {
            log::info!(
                "detector frame size {}x{}",
                frame.frame_width,
                frame.frame_height
            );
            self.adapter
                .set_frame_size(frame.frame_width, frame.frame_height);
        }
        let landmarks = self.adapter.adapt(&frame.detection);

        self.update_occluder(&landmarks, renderer)?;
        self.update_accessory(&landmarks);
        Ok(())
    }

    fn update_occluder<R: Renderer + ?Sized>(
        &mut self,
        landmarks: &FrameLandmarks,
        renderer: &mut R,
    ) -> Result<()> {
        let Some(builder) = self.occlusion.as_mut() else {
            return Ok(());
        };

        if landmarks.face.is_none() {
            if let Some(occluder) = &self.occluder {
                if let Some(node) = self.scene.node_mut(occluder.node) {
                    node.visible = false;
                }
            }
            return Ok(());
        }

        // A failed rebuild keeps whatever geometry the occluder already has.
        let Some(mesh) = builder.build(landmarks, &self.camera) else {
            return Ok(());
        };

        match &self.occluder {
            Some(occluder) => {
                renderer.update_mesh(occluder.mesh, Geometry::Occluder(mesh))?;
                if let Some(node) = self.scene.node_mut(occluder.node) {
                    node.visible = true;
                }
            }
            None => {
                let handle = renderer.create_mesh(Geometry::Occluder(mesh))?;
                let node = self.scene.add_node(
                    "face-occluder",
                    handle,
                    MaterialKind::DepthOnly,
                    OCCLUDER_RENDER_ORDER,
                );
                if let Some(scene_node) = self.scene.node_mut(node) {
                    scene_node.visible = true;
                }
                self.occluder = Some(Occluder { mesh: handle, node });
            }
        }
        Ok(())
    }

    fn update_accessory(&mut self, landmarks: &FrameLandmarks) {
        let Some((id, name, category)) = self.active.as_ref().map(|active| {
            (
                active.descriptor.id.clone(),
                active.descriptor.name.clone(),
                active.descriptor.category,
            )
        }) else {
            return;
        };

        match category.align(landmarks, &self.camera) {
            Ok(placement) if placement.visible && placement.is_finite() => {
                let smoothed = self.smoothing.apply(&id, &placement);
                self.apply_placement(&smoothed);
                self.status.publish(Status::Tracking(name));
            }
            Ok(placement) => {
                if placement.visible {
                    log::debug!("{id}: discarding non-finite placement");
                    return;
                }
                self.smoothing.observe_lost(&id);
                self.hide_accessory();
                if !landmarks.has_any() || missing_subject(category, landmarks) {
                    self.status.publish(Status::NoSubject);
                }
            }
            Err(err) => {
                // Keep the last applied placement for this frame.
                log::debug!("{id}: alignment skipped: {err}");
            }
        }
    }

    fn apply_placement(&mut self, placement: &Placement) {
        let Some(active) = &self.active else {
            return;
        };
        for (instance, node_id) in active.nodes.iter().enumerate() {
            let Some(node) = self.scene.node_mut(*node_id) else {
                continue;
            };
            match Transform::from_placement(placement, instance) {
                Some(transform) if placement.visible => {
                    node.transform = transform;
                    node.visible = true;
                }
                _ => node.visible = false,
            }
        }
    }

    fn hide_accessory(&mut self) {
        let Some(active) = &self.active else {
            return;
        };
        for node_id in &active.nodes {
            if let Some(node) = self.scene.node_mut(*node_id) {
                node.visible = false;
            }
        }
    }
}

fn missing_subject(category: AccessoryCategory, landmarks: &FrameLandmarks) -> bool {
    if category.needs_face() {
        landmarks.face.is_none()
    } else {
        landmarks.pose.is_none()
    }
}

fn accessory_color(category: AccessoryCategory) -> [u8; 4] {
    match category {
        AccessoryCategory::Glasses => [40, 40, 48, 255],
        AccessoryCategory::Earrings => [212, 175, 55, 255],
        AccessoryCategory::Necklace => [192, 192, 200, 255],
        AccessoryCategory::Shirt => [70, 110, 190, 255],
    }
}
