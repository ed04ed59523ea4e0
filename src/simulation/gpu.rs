//! wgpu implementation of the device compute bridge
//!
//! [`GpuContext`] owns a headless adapter, device and queue. [`WgpuBridge`]
//! builds the overlap kernel on that device and implements
//! [`ComputeBridge`] with one command submission per step: staging copy on
//! upload, counter clear plus dispatch, then buffer copies and a blocking map
//! on read-back.

use super::body::{BoxBody, CollisionPair};
use super::bridge::{ComputeBridge, DeviceCounters};
use super::error::DeviceError;
use crate::wgpu_utils::{
    binding_types, ArrayBuffer, BindGroupBuilder, BindGroupLayoutBuilder, BindGroupLayoutWithDesc,
    UniformBuffer,
};
use log::{debug, info};

/// Invocations per workgroup; within the downlevel limit of 256
pub const WORKGROUP_SIZE: u32 = 256;

const COLLISION_KERNEL: &str = r#"
struct BoxRecord {
    position_radius: vec4<f32>,
    velocity: vec4<f32>,
};

struct Pair {
    index1: u32,
    index2: u32,
};

struct Params {
    box_count: u32,
    pair_capacity: u32,
    _pad0: u32,
    _pad1: u32,
};

@group(0) @binding(0) var<storage, read> boxes: array<BoxRecord>;
@group(0) @binding(1) var<storage, read_write> pairs: array<Pair>;
@group(0) @binding(2) var<storage, read_write> counters: array<atomic<u32>, 2>;
@group(0) @binding(3) var<uniform> params: Params;

@compute @workgroup_size(256)
fn detect(@builtin(global_invocation_id) id: vec3<u32>) {
    let i = id.x;
    if (i >= params.box_count) {
        return;
    }

    let a = boxes[i].position_radius;
    for (var j = i + 1u; j < params.box_count; j = j + 1u) {
        let b = boxes[j].position_radius;
        let reach = a.w + b.w;
        let d = abs(a.xyz - b.xyz);
        if (d.x < reach && d.y < reach && d.z < reach) {
            let slot = atomicAdd(&counters[0], 1u);
            if (slot < params.pair_capacity) {
                pairs[slot] = Pair(i, j);
            }
        }
    }
    atomicAdd(&counters[1], params.box_count - i - 1u);
}
"#;

/// Uniform block read by the kernel
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
struct KernelParams {
    box_count: u32,
    pair_capacity: u32,
    _padding: [u32; 2],
}

/// Headless wgpu device used for compute only
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter_info: wgpu::AdapterInfo,
}

impl GpuContext {
    /// Request a high-performance adapter without a surface
    pub fn new_headless() -> Result<Self, DeviceError> {
        pollster::block_on(Self::request())
    }

    async fn request() -> Result<Self, DeviceError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| DeviceError::AdapterUnavailable(e.to_string()))?;

        let adapter_info = adapter.get_info();
        info!(
            "Using adapter {} ({:?}, {:?})",
            adapter_info.name, adapter_info.device_type, adapter_info.backend
        );

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Collision Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_defaults(),
                memory_hints: wgpu::MemoryHints::default(),
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(|e| DeviceError::DeviceRequest(e.to_string()))?;

        Ok(Self {
            device,
            queue,
            adapter_info,
        })
    }
}

/// Buffers whose size follows the population and its overlap count
struct SizedBuffers {
    boxes: ArrayBuffer<BoxBody>,
    box_upload: ArrayBuffer<BoxBody>,
    pairs: ArrayBuffer<CollisionPair>,
    pair_readback: ArrayBuffer<CollisionPair>,
    bind_group: wgpu::BindGroup,
}

/// [`ComputeBridge`] running the overlap kernel through wgpu
pub struct WgpuBridge {
    name: String,
    context: GpuContext,
    pipeline: wgpu::ComputePipeline,
    layout: BindGroupLayoutWithDesc,
    params: UniformBuffer<KernelParams>,
    counters: ArrayBuffer<u32>,
    counter_readback: ArrayBuffer<DeviceCounters>,
    sized: Option<SizedBuffers>,
    uploaded: usize,
}

impl WgpuBridge {
    /// Build the kernel on `context`; size-dependent buffers come later
    pub fn new(context: GpuContext) -> Result<Self, DeviceError> {
        let device = &context.device;

        let layout = BindGroupLayoutBuilder::new()
            .next_binding_compute(binding_types::storage_buffer_read_only())
            .next_binding_compute(binding_types::storage_buffer_read_write())
            .next_binding_compute(binding_types::storage_buffer_read_write())
            .next_binding_compute(binding_types::uniform())
            .create(device, "Collision Bind Group Layout");

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Collision Kernel"),
            source: wgpu::ShaderSource::Wgsl(COLLISION_KERNEL.into()),
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Collision Pipeline Layout"),
            bind_group_layouts: &[&layout.layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Collision Pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("detect"),
            compilation_options: Default::default(),
            cache: None,
        });
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(DeviceError::Pipeline(err.to_string()));
        }

        let params = UniformBuffer::new(device);
        let counters = ArrayBuffer::new(device, 2, false);
        let counter_readback = ArrayBuffer::new_staging(device, 1);

        Ok(Self {
            name: format!("wgpu ({})", context.adapter_info.name),
            context,
            pipeline,
            layout,
            params,
            counters,
            counter_readback,
            sized: None,
            uploaded: 0,
        })
    }

    /// Shorthand for [`GpuContext::new_headless`] followed by [`WgpuBridge::new`]
    pub fn new_headless() -> Result<Self, DeviceError> {
        Self::new(GpuContext::new_headless()?)
    }

    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.context.adapter_info
    }

    fn sized(&self) -> Result<&SizedBuffers, DeviceError> {
        self.sized.as_ref().ok_or(DeviceError::CapacityExceeded {
            capacity: 0,
            requested: self.uploaded.max(1),
        })
    }

    /// Run `create` inside allocation and validation error scopes
    fn scoped<T>(&self, create: impl FnOnce(&wgpu::Device) -> T) -> Result<T, DeviceError> {
        let device = &self.context.device;
        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let value = create(device);

        let validation = pollster::block_on(device.pop_error_scope());
        let out_of_memory = pollster::block_on(device.pop_error_scope());
        match validation.or(out_of_memory) {
            Some(err) => Err(DeviceError::BufferAllocation(err.to_string())),
            None => Ok(value),
        }
    }

    fn create_bind_group(
        &self,
        device: &wgpu::Device,
        boxes: &ArrayBuffer<BoxBody>,
        pairs: &ArrayBuffer<CollisionPair>,
    ) -> wgpu::BindGroup {
        BindGroupBuilder::new(&self.layout)
            .buffer(boxes.buffer())
            .buffer(pairs.buffer())
            .buffer(self.counters.buffer())
            .buffer(self.params.buffer())
            .create(device, "Collision Bind Group")
    }

    fn submit(&self, encoder: wgpu::CommandEncoder) {
        self.context.queue.submit(Some(encoder.finish()));
    }

    fn encoder(&self, label: &str) -> wgpu::CommandEncoder {
        self.context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) })
    }
}

/// Map `slice` and block until the mapping is usable
fn map_blocking(
    device: &wgpu::Device,
    slice: wgpu::BufferSlice<'_>,
    mode: wgpu::MapMode,
) -> Result<(), DeviceError> {
    let (tx, rx) = futures::channel::oneshot::channel();
    slice.map_async(mode, move |result| {
        let _ = tx.send(result);
    });

    device
        .poll(wgpu::PollType::Wait)
        .map_err(|e| DeviceError::Poll(e.to_string()))?;

    match futures::executor::block_on(rx) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(DeviceError::Map(e.to_string())),
        Err(_) => Err(DeviceError::Map("map callback was dropped".to_string())),
    }
}

impl ComputeBridge for WgpuBridge {
    fn name(&self) -> &str {
        &self.name
    }

    fn capacity(&self) -> usize {
        self.sized.as_ref().map_or(0, |sized| sized.boxes.capacity())
    }

    fn pair_capacity(&self) -> usize {
        self.sized.as_ref().map_or(0, |sized| sized.pairs.capacity())
    }

    fn recreate_buffers(&mut self, max_boxes: usize) -> Result<(), DeviceError> {
        let capacity = max_boxes.max(1);
        let pair_capacity = capacity.max(self.pair_capacity());

        // Drop the old set first so both never live at once.
        self.sized = None;
        self.uploaded = 0;

        let sized = self.scoped(|device| {
            let boxes = ArrayBuffer::<BoxBody>::new(device, capacity, true);
            let box_upload = ArrayBuffer::<BoxBody>::new_upload(device, capacity);
            let pairs = ArrayBuffer::<CollisionPair>::new(device, pair_capacity, false);
            let pair_readback = ArrayBuffer::<CollisionPair>::new_staging(device, pair_capacity);
            let bind_group = self.create_bind_group(device, &boxes, &pairs);
            SizedBuffers {
                boxes,
                box_upload,
                pairs,
                pair_readback,
                bind_group,
            }
        })?;

        debug!(
            "Allocated device buffers for {} boxes and {} pairs",
            capacity, pair_capacity
        );
        self.sized = Some(sized);
        Ok(())
    }

    fn reserve_pairs(&mut self, max_pairs: usize) -> Result<(), DeviceError> {
        let pair_capacity = max_pairs.max(1);
        let (pairs, pair_readback, bind_group) = {
            let sized = self.sized()?;
            self.scoped(|device| {
                let pairs = ArrayBuffer::<CollisionPair>::new(device, pair_capacity, false);
                let pair_readback =
                    ArrayBuffer::<CollisionPair>::new_staging(device, pair_capacity);
                let bind_group = self.create_bind_group(device, &sized.boxes, &pairs);
                (pairs, pair_readback, bind_group)
            })?
        };

        debug!("Reallocated the pair buffer for {} pairs", pair_capacity);
        if let Some(sized) = self.sized.as_mut() {
            sized.pairs = pairs;
            sized.pair_readback = pair_readback;
            sized.bind_group = bind_group;
        }
        Ok(())
    }

    fn upload(&mut self, boxes: &[BoxBody]) -> Result<(), DeviceError> {
        let sized = self.sized()?;
        if boxes.len() > sized.boxes.capacity() {
            return Err(DeviceError::CapacityExceeded {
                capacity: sized.boxes.capacity(),
                requested: boxes.len(),
            });
        }
        if boxes.is_empty() {
            self.uploaded = 0;
            return Ok(());
        }

        let byte_len = ArrayBuffer::<BoxBody>::bytes_for(boxes.len());
        let staging = sized.box_upload.buffer();
        let slice = staging.slice(..byte_len);
        map_blocking(&self.context.device, slice, wgpu::MapMode::Write)?;
        slice
            .get_mapped_range_mut()
            .copy_from_slice(bytemuck::cast_slice(boxes));
        staging.unmap();

        let mut encoder = self.encoder("Box Upload Encoder");
        encoder.copy_buffer_to_buffer(staging, 0, sized.boxes.buffer(), 0, byte_len);
        self.submit(encoder);

        self.uploaded = boxes.len();
        Ok(())
    }

    fn dispatch(&mut self, box_count: usize) -> Result<(), DeviceError> {
        if box_count > self.uploaded {
            return Err(DeviceError::CapacityExceeded {
                capacity: self.uploaded,
                requested: box_count,
            });
        }

        let pair_capacity = self.sized()?.pairs.capacity();
        self.params.update_content(
            &self.context.queue,
            KernelParams {
                box_count: box_count as u32,
                pair_capacity: pair_capacity as u32,
                _padding: [0; 2],
            },
        );

        let sized = self.sized()?;
        let mut encoder = self.encoder("Collision Dispatch Encoder");
        encoder.clear_buffer(self.counters.buffer(), 0, None);
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Collision Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &sized.bind_group, &[]);
            pass.dispatch_workgroups((box_count as u32).div_ceil(WORKGROUP_SIZE), 1, 1);
        }
        self.submit(encoder);
        Ok(())
    }

    fn read_back(&mut self, pairs: &mut Vec<CollisionPair>) -> Result<DeviceCounters, DeviceError> {
        let sized = self.sized()?;
        let device = &self.context.device;

        let mut encoder = self.encoder("Collision Readback Encoder");
        encoder.copy_buffer_to_buffer(
            self.counters.buffer(),
            0,
            self.counter_readback.buffer(),
            0,
            ArrayBuffer::<DeviceCounters>::bytes_for(1),
        );
        encoder.copy_buffer_to_buffer(
            sized.pairs.buffer(),
            0,
            sized.pair_readback.buffer(),
            0,
            ArrayBuffer::<CollisionPair>::bytes_for(sized.pairs.capacity()),
        );
        self.submit(encoder);

        let counter_buffer = self.counter_readback.buffer();
        let counter_slice = counter_buffer.slice(..);
        map_blocking(device, counter_slice, wgpu::MapMode::Read)?;
        let counters: DeviceCounters = *bytemuck::from_bytes(&counter_slice.get_mapped_range());
        counter_buffer.unmap();

        let valid = (counters.pairs as usize).min(sized.pairs.capacity());
        if valid > 0 {
            let pair_buffer = sized.pair_readback.buffer();
            let pair_slice = pair_buffer.slice(..ArrayBuffer::<CollisionPair>::bytes_for(valid));
            map_blocking(device, pair_slice, wgpu::MapMode::Read)?;
            pairs.extend_from_slice(bytemuck::cast_slice::<u8, CollisionPair>(
                &pair_slice.get_mapped_range(),
            ));
            pair_buffer.unmap();
        }

        Ok(counters)
    }
}
