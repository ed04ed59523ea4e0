// src/wgpu_utils/uniform_buffer.rs - Typed uniform, storage and staging buffers
use std::marker::PhantomData;

fn short_type_name<T>() -> &'static str {
    let type_name = std::any::type_name::<T>();
    match type_name.rfind(':') {
        Some(pos) => &type_name[(pos + 1)..],
        None => type_name,
    }
}

/// Uniform buffer holding a single `Content` value
pub struct UniformBuffer<Content> {
    buffer: wgpu::Buffer,
    content_type: PhantomData<Content>,
    previous_content: Vec<u8>,
}

impl<Content: bytemuck::Pod> UniformBuffer<Content> {
    /// Create a new uniform buffer
    pub fn new(device: &wgpu::Device) -> Self {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("UniformBuffer: {}", short_type_name::<Content>())),
            size: std::mem::size_of::<Content>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        UniformBuffer {
            buffer,
            content_type: PhantomData,
            previous_content: Vec::new(),
        }
    }

    /// Update buffer content (skips the write when nothing changed)
    pub fn update_content(&mut self, queue: &wgpu::Queue, content: Content) {
        let new_content = bytemuck::bytes_of(&content);
        if self.previous_content == new_content {
            return;
        }
        queue.write_buffer(&self.buffer, 0, new_content);
        self.previous_content = new_content.to_vec();
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }
}

/// Fixed-capacity buffer of `Content` records
///
/// The same wrapper covers device storage, CPU-writable upload staging and
/// CPU-readable readback staging; only the usage flags differ.
pub struct ArrayBuffer<Content> {
    buffer: wgpu::Buffer,
    content_type: PhantomData<Content>,
    capacity: usize,
}

impl<Content: bytemuck::Pod> ArrayBuffer<Content> {
    fn create(device: &wgpu::Device, kind: &str, capacity: usize, usage: wgpu::BufferUsages) -> Self {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("{}<{}>", kind, short_type_name::<Content>())),
            size: Self::bytes_for(capacity),
            usage,
            mapped_at_creation: false,
        });

        ArrayBuffer {
            buffer,
            content_type: PhantomData,
            capacity,
        }
    }

    /// Storage buffer for compute shaders
    pub fn new(device: &wgpu::Device, capacity: usize, read_only: bool) -> Self {
        let usage = if read_only {
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST
        } else {
            wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC
        };
        Self::create(device, "ArrayBuffer", capacity, usage)
    }

    /// Staging buffer for reading device data back on the CPU
    pub fn new_staging(device: &wgpu::Device, capacity: usize) -> Self {
        Self::create(
            device,
            "StagingBuffer",
            capacity,
            wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        )
    }

    /// Staging buffer the CPU writes into before a device-side copy
    pub fn new_upload(device: &wgpu::Device, capacity: usize) -> Self {
        Self::create(
            device,
            "UploadBuffer",
            capacity,
            wgpu::BufferUsages::MAP_WRITE | wgpu::BufferUsages::COPY_SRC,
        )
    }

    /// Size in bytes of `count` records
    pub fn bytes_for(count: usize) -> u64 {
        (count * std::mem::size_of::<Content>()) as u64
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
