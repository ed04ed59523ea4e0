// src/wgpu_utils/binding_types.rs
//! WGPU binding type utilities for compute buffers

pub fn buffer(read_only: bool) -> wgpu::BindingType {
    wgpu::BindingType::Buffer {
        ty: wgpu::BufferBindingType::Storage { read_only },
        has_dynamic_offset: false,
        min_binding_size: None,
    }
}

pub fn storage_buffer_read_write() -> wgpu::BindingType {
    buffer(false)
}

pub fn storage_buffer_read_only() -> wgpu::BindingType {
    buffer(true)
}

pub fn uniform() -> wgpu::BindingType {
    wgpu::BindingType::Buffer {
        ty: wgpu::BufferBindingType::Uniform,
        has_dynamic_offset: false,
        min_binding_size: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_helpers_set_access() {
        assert!(matches!(
            storage_buffer_read_only(),
            wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only: true },
                ..
            }
        ));
        assert!(matches!(
            storage_buffer_read_write(),
            wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only: false },
                ..
            }
        ));
        assert!(matches!(
            uniform(),
            wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                ..
            }
        ));
    }
}
